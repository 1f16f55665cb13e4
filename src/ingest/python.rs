//! Python extraction using tree-sitter-python.
//!
//! Same contract as the Rust extractor: file-scoped resolution, shared
//! module nodes for imports, reduced confidence on name guesses.

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
        .set_language(&tree_sitter_python::language())
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
        callables_by_name: AHashMap::new(),
        classes_by_name: AHashMap::new(),
        call_sites: Vec::new(),
        pending_bases: Vec::new(),
    };
    walker.emit_file_node(&root);
    walker.walk_statements(&root, &file_node_id(file_key), None);
    walker.resolve_references();
    Ok(walker.extraction)
}

struct Walker<'a> {
    file_key: &'a str,
    source: &'a str,
    extraction: Extraction,
    callables_by_name: AHashMap<String, String>,
    classes_by_name: AHashMap<String, String>,
    call_sites: Vec<(String, String, i64)>,
    /// (subclass node id, base class bare name, line)
    pending_bases: Vec<(String, String, i64)>,
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

    /// `def` line without the body.
    fn signature_of(&self, node: &Node<'_>) -> String {
        let end = node
            .child_by_field_name("body")
            .map(|b| b.start_byte())
            .unwrap_or_else(|| node.end_byte());
        self.source[node.start_byte()..end]
            .trim()
            .trim_end_matches(':')
            .trim()
            .to_string()
    }

    fn walk_statements(&mut self, container: &Node<'_>, parent_id: &str, class: Option<&str>) {
        let mut cursor = container.walk();
        let children: Vec<Node<'_>> = container.named_children(&mut cursor).collect();
        for child in children {
            // Decorators wrap the definition they annotate
            let stmt = if child.kind() == "decorated_definition" {
                match child.child_by_field_name("definition") {
                    Some(inner) => inner,
                    None => continue,
                }
            } else {
                child
            };
            match stmt.kind() {
                "function_definition" => {
                    if let Some(name) = self.name_of(&stmt) {
                        let (kind, display) = match class {
                            Some(class_name) => {
                                (NodeKind::Method, format!("{}.{}", class_name, name))
                            }
                            None => (NodeKind::Function, name.clone()),
                        };
                        let id = self.emit_symbol(&stmt, kind, &display, parent_id);
                        self.callables_by_name.entry(name).or_insert(id.clone());
                        self.collect_call_sites(&stmt, &id);
                    }
                }
                "class_definition" => {
                    if let Some(name) = self.name_of(&stmt) {
                        let id = self.emit_symbol(&stmt, NodeKind::Class, &name, parent_id);
                        self.classes_by_name.insert(name.clone(), id.clone());
                        self.collect_bases(&stmt, &id);
                        if let Some(body) = stmt.child_by_field_name("body") {
                            self.walk_statements(&body, &id, Some(&name));
                        }
                    }
                }
                "import_statement" | "import_from_statement" => self.emit_import(&stmt),
                _ => {}
            }
        }
    }

    fn collect_bases(&mut self, class_node: &Node<'_>, class_id: &str) {
        let Some(bases) = class_node.child_by_field_name("superclasses") else {
            return;
        };
        let mut cursor = bases.walk();
        for base in bases.named_children(&mut cursor) {
            if base.kind() == "identifier" {
                self.pending_bases.push((
                    class_id.to_string(),
                    self.text(&base).to_string(),
                    base.start_position().row as i64 + 1,
                ));
            }
        }
    }

    fn emit_import(&mut self, import_node: &Node<'_>) {
        let import_path = match import_node.kind() {
            "import_from_statement" => import_node
                .child_by_field_name("module_name")
                .map(|n| self.text(&n).to_string()),
            _ => {
                let mut cursor = import_node.walk();
                let target = import_node
                    .named_children(&mut cursor)
                    .find(|n| n.kind() == "dotted_name" || n.kind() == "aliased_import");
                target.map(|n| match n.kind() {
                    "aliased_import" => n
                        .child_by_field_name("name")
                        .map(|m| self.text(&m).to_string())
                        .unwrap_or_default(),
                    _ => self.text(&n).to_string(),
                })
            }
        };
        let Some(import_path) = import_path.filter(|p| !p.is_empty()) else {
            return;
        };
        let module_id = module_node_id(&import_path);
        self.extraction.push_node(CodeNode {
            id: module_id.clone(),
            kind: NodeKind::Module,
            name: import_path.clone(),
            line_start: import_node.start_position().row as i64 + 1,
            line_end: import_node.end_position().row as i64 + 1,
            signature: None,
            content_hash: content_hash(import_path.as_bytes()),
        });
        self.extraction.push_edge(CodeEdge {
            from_id: file_node_id(self.file_key),
            to_id: module_id,
            kind: EdgeKind::Imports,
            confidence: 1.0,
            line_number: Some(import_node.start_position().row as i64 + 1),
        });
    }

    fn collect_call_sites(&mut self, function_node: &Node<'_>, caller_id: &str) {
        let Some(body) = function_node.child_by_field_name("body") else {
            return;
        };
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            if node.kind() == "call" {
                if let Some(callee) = node.child_by_field_name("function") {
                    if callee.kind() == "identifier" {
                        self.call_sites.push((
                            caller_id.to_string(),
                            self.text(&callee).to_string(),
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

    fn resolve_references(&mut self) {
        let sites = std::mem::take(&mut self.call_sites);
        for (caller_id, callee_name, line) in sites {
            if let Some(target_id) = self.callables_by_name.get(&callee_name) {
                self.extraction.push_edge(CodeEdge {
                    from_id: caller_id,
                    to_id: target_id.clone(),
                    kind: EdgeKind::Calls,
                    confidence: 0.8,
                    line_number: Some(line),
                });
            }
        }
        let bases = std::mem::take(&mut self.pending_bases);
        for (subclass_id, base_name, line) in bases {
            if let Some(base_id) = self.classes_by_name.get(&base_name) {
                self.extraction.push_edge(CodeEdge {
                    from_id: subclass_id,
                    to_id: base_id.clone(),
                    kind: EdgeKind::Extends,
                    confidence: 0.8,
                    line_number: Some(line),
                });
            }
        }
    }
}
