//! Rust extraction using tree-sitter-rust.
//!
//! Walks top-level items (recursing through inline modules and impl
//! blocks), then resolves call references against names defined in the
//! same file. Cross-file resolution is deliberately out of scope; imports
//! become shared module nodes instead.

use ahash::AHashMap;
use tree_sitter::Node;

use crate::common::content_hash;
use crate::error::ParseFailure;
use crate::graph::{EdgeKind, NodeKind};
use crate::ingest::{
    file_node_id, module_node_id, parse_failure, symbol_node_id, CodeEdge, CodeNode, Extraction,
};

pub fn extract(
    file_key: &str,
    source: &str,
    timeout_micros: u64,
) -> Result<Extraction, ParseFailure> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_rust::language())
        .map_err(|e| parse_failure(file_key, format!("grammar mismatch: {e}")))?;
    parser.set_timeout_micros(timeout_micros);

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| parse_failure(file_key, "parse timed out"))?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(parse_failure(file_key, "syntax errors in source"));
    }

    let mut walker = Walker {
        file_key,
        source,
        extraction: Extraction::default(),
        functions_by_name: AHashMap::new(),
        call_sites: Vec::new(),
    };
    walker.emit_file_node(&root);
    walker.walk_items(&root, &file_node_id(file_key), "");
    walker.resolve_calls();
    Ok(walker.extraction)
}

struct Walker<'a> {
    file_key: &'a str,
    source: &'a str,
    extraction: Extraction,
    /// Bare name -> node id, for file-scoped call resolution
    functions_by_name: AHashMap<String, String>,
    /// (caller node id, callee bare name, line)
    call_sites: Vec<(String, String, i64)>,
}

impl<'a> Walker<'a> {
    fn text(&self, node: &Node<'_>) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn name_of(&self, node: &Node<'_>) -> Option<String> {
        node.child_by_field_name("name")
            .map(|n| self.text(&n).to_string())
    }

    fn emit_file_node(&mut self, root: &Node<'_>) {
        self.extraction.push_node(CodeNode {
            id: file_node_id(self.file_key),
            kind: NodeKind::File,
            name: self.file_key.to_string(),
            line_start: 1,
            line_end: root.end_position().row as i64 + 1,
            signature: None,
            content_hash: content_hash(self.source.as_bytes()),
        });
    }

    fn emit_symbol(&mut self, node: &Node<'_>, kind: NodeKind, name: &str, parent_id: &str) -> String {
        let id = symbol_node_id(&kind, self.file_key, name);
        let signature = match kind {
            NodeKind::Function | NodeKind::Method => Some(self.signature_of(node)),
            _ => None,
        };
        self.extraction.push_node(CodeNode {
            id: id.clone(),
            kind,
            name: name.to_string(),
            line_start: node.start_position().row as i64 + 1,
            line_end: node.end_position().row as i64 + 1,
            signature,
            content_hash: content_hash(self.text(node).as_bytes()),
        });
        self.extraction.push_edge(CodeEdge {
            from_id: parent_id.to_string(),
            to_id: id.clone(),
            kind: EdgeKind::Contains,
            confidence: 1.0,
            line_number: Some(node.start_position().row as i64 + 1),
        });
        id
    }

    /// Declaration text up to the body (or the whole node if bodyless).
    fn signature_of(&self, node: &Node<'_>) -> String {
        let end = node
            .child_by_field_name("body")
            .map(|b| b.start_byte())
            .unwrap_or_else(|| node.end_byte());
        self.source[node.start_byte()..end].trim().to_string()
    }

    fn walk_items(&mut self, container: &Node<'_>, parent_id: &str, scope: &str) {
        let mut cursor = container.walk();
        let children: Vec<Node<'_>> = container.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "function_item" => {
                    if let Some(name) = self.name_of(&child) {
                        let scoped = scoped_name(scope, &name);
                        let id =
                            self.emit_symbol(&child, NodeKind::Function, &scoped, parent_id);
                        self.functions_by_name.entry(name).or_insert(id.clone());
                        self.collect_call_sites(&child, &id);
                    }
                }
                "struct_item" => {
                    if let Some(name) = self.name_of(&child) {
                        self.emit_symbol(&child, NodeKind::Class, &scoped_name(scope, &name), parent_id);
                    }
                }
                "enum_item" => {
                    if let Some(name) = self.name_of(&child) {
                        self.emit_symbol(&child, NodeKind::Enum, &scoped_name(scope, &name), parent_id);
                    }
                }
                "trait_item" => {
                    if let Some(name) = self.name_of(&child) {
                        self.emit_symbol(&child, NodeKind::Interface, &scoped_name(scope, &name), parent_id);
                    }
                }
                "type_item" => {
                    if let Some(name) = self.name_of(&child) {
                        self.emit_symbol(&child, NodeKind::TypeAlias, &scoped_name(scope, &name), parent_id);
                    }
                }
                "const_item" | "static_item" => {
                    if let Some(name) = self.name_of(&child) {
                        self.emit_symbol(&child, NodeKind::Constant, &scoped_name(scope, &name), parent_id);
                    }
                }
                "mod_item" => {
                    if let Some(name) = self.name_of(&child) {
                        let scoped = scoped_name(scope, &name);
                        let id = self.emit_symbol(&child, NodeKind::Module, &scoped, parent_id);
                        if let Some(body) = child.child_by_field_name("body") {
                            self.walk_items(&body, &id, &scoped);
                        }
                    }
                }
                "impl_item" => self.walk_impl(&child, parent_id, scope),
                "use_declaration" => self.emit_import(&child),
                _ => {}
            }
        }
    }

    fn walk_impl(&mut self, impl_node: &Node<'_>, file_parent: &str, scope: &str) {
        let Some(type_name) = impl_node
            .child_by_field_name("type")
            .map(|n| self.text(&n).to_string())
        else {
            return;
        };
        let class_id = symbol_node_id(
            &NodeKind::Class,
            self.file_key,
            &scoped_name(scope, &type_name),
        );
        let class_defined_here = self
            .extraction
            .nodes
            .iter()
            .any(|n| n.id == class_id);
        let parent_id = if class_defined_here {
            class_id.clone()
        } else {
            file_parent.to_string()
        };

        // `impl Trait for Type` where the trait lives in the same file
        if let Some(trait_node) = impl_node.child_by_field_name("trait") {
            let trait_name = scoped_name(scope, self.text(&trait_node));
            let trait_id = symbol_node_id(&NodeKind::Interface, self.file_key, &trait_name);
            if class_defined_here
                && self.extraction.nodes.iter().any(|n| n.id == trait_id)
            {
                self.extraction.push_edge(CodeEdge {
                    from_id: class_id.clone(),
                    to_id: trait_id,
                    kind: EdgeKind::Implements,
                    confidence: 0.8,
                    line_number: Some(impl_node.start_position().row as i64 + 1),
                });
            }
        }

        if let Some(body) = impl_node.child_by_field_name("body") {
            let mut cursor = body.walk();
            let methods: Vec<Node<'_>> = body
                .named_children(&mut cursor)
                .filter(|n| n.kind() == "function_item")
                .collect();
            for method in methods {
                if let Some(name) = self.name_of(&method) {
                    let method_name = format!("{}::{}", scoped_name(scope, &type_name), name);
                    let id = self.emit_symbol(&method, NodeKind::Method, &method_name, &parent_id);
                    self.functions_by_name.entry(name).or_insert(id.clone());
                    self.collect_call_sites(&method, &id);
                }
            }
        }
    }

    fn emit_import(&mut self, use_node: &Node<'_>) {
        let Some(arg) = use_node.child_by_field_name("argument") else {
            return;
        };
        let import_path = self.text(&arg).split_whitespace().collect::<String>();
        if import_path.is_empty() {
            return;
        }
        let module_id = module_node_id(&import_path);
        self.extraction.push_node(CodeNode {
            id: module_id.clone(),
            kind: NodeKind::Module,
            name: import_path.clone(),
            line_start: use_node.start_position().row as i64 + 1,
            line_end: use_node.end_position().row as i64 + 1,
            signature: None,
            content_hash: content_hash(import_path.as_bytes()),
        });
        self.extraction.push_edge(CodeEdge {
            from_id: file_node_id(self.file_key),
            to_id: module_id,
            kind: EdgeKind::Imports,
            confidence: 1.0,
            line_number: Some(use_node.start_position().row as i64 + 1),
        });
    }

    /// Gather `call_expression` callee names inside a function body.
    fn collect_call_sites(&mut self, function_node: &Node<'_>, caller_id: &str) {
        let Some(body) = function_node.child_by_field_name("body") else {
            return;
        };
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            if node.kind() == "call_expression" {
                if let Some(callee) = node.child_by_field_name("function") {
                    if let Some(name) = callee_name(&callee, self.source) {
                        self.call_sites.push((
                            caller_id.to_string(),
                            name,
                            node.start_position().row as i64 + 1,
                        ));
                    }
                }
            }
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                stack.push(child);
            }
        }
    }

    /// Name-based call resolution, file scope only. Resolution is a guess,
    /// so the edge carries reduced confidence.
    fn resolve_calls(&mut self) {
        let sites = std::mem::take(&mut self.call_sites);
        for (caller_id, callee_name, line) in sites {
            if let Some(target_id) = self.functions_by_name.get(&callee_name) {
                self.extraction.push_edge(CodeEdge {
                    from_id: caller_id,
                    to_id: target_id.clone(),
                    kind: EdgeKind::Calls,
                    confidence: 0.8,
                    line_number: Some(line),
                });
            }
        }
    }
}

fn scoped_name(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", scope, name)
    }
}

/// Bare identifier a call expression resolves through. Method calls on
/// receivers are skipped; their targets need type information.
fn callee_name(callee: &Node<'_>, source: &str) -> Option<String> {
    match callee.kind() {
        "identifier" => callee
            .utf8_text(source.as_bytes())
            .ok()
            .map(|s| s.to_string()),
        "scoped_identifier" => {
            let name = callee.child_by_field_name("name")?;
            name.utf8_text(source.as_bytes()).ok().map(|s| s.to_string())
        }
        _ => None,
    }
}
