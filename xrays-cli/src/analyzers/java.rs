//! Java front-end driven by the tree-sitter grammar.
//!
//! Normalizes to the same structural summary as the Python analyzer: method
//! complexity, anemic-model metrics, and god-class measurements per
//! top-level class or record. Files with syntax errors yield an empty
//! summary.

use regex::Regex;
use rustc_hash::FxHashSet;
use std::sync::OnceLock;
use tracing::debug;
use tree_sitter::{Node, Parser};

use crate::analyzers::{FileAst, GodCandidate};
use crate::models::{ClassMetrics, FunctionComplexity};

const CLASS_KINDS: [&str; 2] = ["class_declaration", "record_declaration"];
const DECISION_KINDS: [&str; 7] = [
    "if_statement",
    "for_statement",
    "enhanced_for_statement",
    "while_statement",
    "do_statement",
    "catch_clause",
    "ternary_expression",
];
const NESTING_KINDS: [&str; 7] = [
    "if_statement",
    "for_statement",
    "enhanced_for_statement",
    "while_statement",
    "do_statement",
    "try_statement",
    "switch_expression",
];
const LOGIC_KINDS: [&str; 7] = [
    "if_statement",
    "for_statement",
    "enhanced_for_statement",
    "while_statement",
    "do_statement",
    "try_statement",
    "switch_expression",
];

fn accessor_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(get|set|is)[A-Z]").expect("valid pattern"))
}

pub fn analyze_source(source: &str, path: &str) -> FileAst {
    let mut parser = Parser::new();
    let language = tree_sitter_java::LANGUAGE;
    if parser.set_language(&language.into()).is_err() {
        return empty(path);
    }
    let Some(tree) = parser.parse(source, None) else {
        debug!(%path, "java parse failed");
        return empty(path);
    };
    let root = tree.root_node();
    if root.has_error() {
        debug!(%path, "java source has syntax errors");
        return empty(path);
    }

    let bytes = source.as_bytes();
    let mut out = FileAst {
        path: path.to_string(),
        ..FileAst::default()
    };

    let mut cursor = root.walk();
    for top in root.named_children(&mut cursor) {
        if top.kind() == "import_declaration" {
            if let Some(class) = imported_class(top, bytes) {
                out.imports.push(class);
            }
        } else if CLASS_KINDS.contains(&top.kind()) {
            let class_name = node_name(top, bytes).unwrap_or_else(|| "<unknown>".into());
            for method in methods_of(top) {
                if method.kind() == "method_declaration" {
                    let name = node_name(method, bytes).unwrap_or_default();
                    out.functions
                        .push(method_complexity(method, &class_name, &name, path));
                }
            }
            out.classes.push(anemic_metrics(top, bytes, path));
            out.god_candidates.push(god_candidate(top, bytes));
        }
    }

    out.imports.sort();
    out.imports.dedup();
    out
}

fn empty(path: &str) -> FileAst {
    FileAst {
        path: path.to_string(),
        ..FileAst::default()
    }
}

fn node_name(node: Node, source: &[u8]) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
        .map(str::to_string)
}

fn methods_of(class: Node) -> Vec<Node> {
    let mut out = Vec::new();
    if let Some(body) = class.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            if child.kind() == "method_declaration" || child.kind() == "constructor_declaration" {
                out.push(child);
            }
        }
    }
    out
}

/// `import com.acme.Widget;` contributes `Widget`.
fn imported_class(node: Node, source: &[u8]) -> Option<String> {
    let text = node.utf8_text(source).ok()?;
    let cleaned = text
        .trim_start_matches("import")
        .trim()
        .trim_start_matches("static")
        .trim()
        .trim_end_matches(';')
        .trim();
    let last = cleaned.rsplit('.').next()?;
    if last.is_empty() || last == "*" {
        None
    } else {
        Some(last.to_string())
    }
}

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

fn method_complexity(method: Node, class_name: &str, name: &str, path: &str) -> FunctionComplexity {
    let body = method.child_by_field_name("body");
    let (decisions, branches, excepts) = match body {
        Some(b) => count_decisions(b),
        None => (0, 0, 0),
    };
    let start = method.start_position().row as u32 + 1;
    let end = method.end_position().row as u32 + 1;

    FunctionComplexity {
        file: path.to_string(),
        name: format!("{class_name}.{name}"),
        line: start,
        cyclomatic: 1 + decisions,
        cognitive: body.map(|b| cognitive_of(b, 0)).unwrap_or(0),
        max_nesting: body.map(max_nesting).unwrap_or(0),
        branches,
        except_paths: excepts,
        length: end - start + 1,
    }
}

/// (decision points, if count, catch count) via a full iterative walk.
fn count_decisions(body: Node) -> (u64, u64, u64) {
    let mut decisions = 0u64;
    let mut branches = 0u64;
    let mut excepts = 0u64;

    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        let kind = node.kind();
        if DECISION_KINDS.contains(&kind) {
            decisions += 1;
            if kind == "if_statement" {
                branches += 1;
            } else if kind == "catch_clause" {
                excepts += 1;
            }
        } else if kind == "switch_label" {
            // `case` arms branch; `default` does not.
            if node.child(0).map(|c| c.kind()) != Some("default") {
                decisions += 1;
            }
        } else if kind == "binary_expression" {
            if let Some(op) = node.child_by_field_name("operator") {
                if op.kind() == "&&" || op.kind() == "||" {
                    decisions += 1;
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    (decisions, branches, excepts)
}

fn max_nesting(body: Node) -> u32 {
    let mut max = 0u32;
    let mut stack: Vec<(Node, u32)> = vec![(body, 0)];
    while let Some((node, depth)) = stack.pop() {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let child_depth = if NESTING_KINDS.contains(&child.kind()) {
                // An `else if` hangs off the parent's alternative and counts
                // one level deeper.
                depth + 1
            } else {
                depth
            };
            max = max.max(child_depth);
            stack.push((child, child_depth));
        }
    }
    max
}

/// SonarSource-shaped cognitive complexity over the statement tree.
fn cognitive_of(node: Node, nesting: u64) -> u64 {
    let mut total = 0u64;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        total += cognitive_node(child, nesting);
    }
    total
}

fn cognitive_node(node: Node, nesting: u64) -> u64 {
    match node.kind() {
        "if_statement" => cognitive_if(node, nesting, false),
        "for_statement" | "enhanced_for_statement" | "while_statement" | "do_statement" => {
            let mut total = 1 + nesting;
            if let Some(cond) = node.child_by_field_name("condition") {
                total += bool_sequences(cond);
            }
            if let Some(body) = node.child_by_field_name("body") {
                total += cognitive_node(body, nesting + 1);
            }
            total
        }
        "try_statement" | "try_with_resources_statement" => {
            let mut total = 0;
            if let Some(body) = node.child_by_field_name("body") {
                total += cognitive_of(body, nesting);
            }
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if child.kind() == "catch_clause" {
                    total += 1 + nesting;
                    if let Some(body) = child.child_by_field_name("body") {
                        total += cognitive_of(body, nesting + 1);
                    }
                } else if child.kind() == "finally_clause" {
                    total += cognitive_of(child, nesting);
                }
            }
            total
        }
        "switch_expression" => {
            let mut total = 1 + nesting;
            if let Some(body) = node.child_by_field_name("body") {
                total += cognitive_of(body, nesting + 1);
            }
            total
        }
        "ternary_expression" => {
            let mut total = 1 + nesting;
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                total += bool_sequences(child);
            }
            total
        }
        // Nested type declarations are not entered.
        "class_declaration" | "record_declaration" | "interface_declaration"
        | "enum_declaration" => 0,
        "block" => cognitive_of(node, nesting),
        _ => {
            let mut total = bool_sequences_shallow(node);
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                total += cognitive_node(child, nesting);
            }
            total
        }
    }
}

fn cognitive_if(node: Node, nesting: u64, as_else_if: bool) -> u64 {
    let mut total = if as_else_if { 1 } else { 1 + nesting };
    if let Some(cond) = node.child_by_field_name("condition") {
        total += bool_sequences(cond);
    }
    if let Some(consequence) = node.child_by_field_name("consequence") {
        total += cognitive_node(consequence, nesting + 1);
    }
    if let Some(alternative) = node.child_by_field_name("alternative") {
        if alternative.kind() == "if_statement" {
            total += cognitive_if(alternative, nesting, true);
        } else {
            total += 1 + cognitive_node(alternative, nesting + 1);
        }
    }
    total
}

/// One point per run of a logical operator; alternations start new runs.
fn bool_sequences(node: Node) -> u64 {
    let mut total = bool_sequences_shallow(node);
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        total += bool_sequences(child);
    }
    total
}

fn bool_sequences_shallow(node: Node) -> u64 {
    if node.kind() != "binary_expression" {
        return 0;
    }
    let Some(op) = node.child_by_field_name("operator") else {
        return 0;
    };
    let op_kind = op.kind();
    if op_kind != "&&" && op_kind != "||" {
        return 0;
    }
    // Count only the head of a same-operator chain.
    if let Some(parent) = node.parent() {
        if parent.kind() == "binary_expression" {
            if let Some(parent_op) = parent.child_by_field_name("operator") {
                if parent_op.kind() == op_kind {
                    return 0;
                }
            }
        }
    }
    1
}

// ---------------------------------------------------------------------------
// Anemic model
// ---------------------------------------------------------------------------

fn has_logic(node: Node) -> bool {
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        if LOGIC_KINDS.contains(&n.kind()) {
            return true;
        }
        let mut cursor = n.walk();
        for child in n.children(&mut cursor) {
            stack.push(child);
        }
    }
    false
}

fn is_accessor(method: Node, source: &[u8]) -> bool {
    let Some(name) = node_name(method, source) else {
        return false;
    };
    if !accessor_pattern().is_match(&name) {
        return false;
    }
    match method.child_by_field_name("body") {
        Some(body) => !has_logic(body),
        None => true,
    }
}

/// Field declarators in the class body; record parameters count as fields.
fn count_fields(class: Node) -> usize {
    let mut count = 0;
    if class.kind() == "record_declaration" {
        if let Some(params) = class.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            count += params
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "formal_parameter")
                .count();
        }
    }
    if let Some(body) = class.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            if child.kind() == "field_declaration" {
                let mut inner = child.walk();
                count += child
                    .named_children(&mut inner)
                    .filter(|c| c.kind() == "variable_declarator")
                    .count();
            }
        }
    }
    count
}

fn candidate_methods<'a>(class: Node<'a>, source: &[u8]) -> Vec<Node<'a>> {
    methods_of(class)
        .into_iter()
        .filter(|m| m.kind() == "method_declaration" && !is_accessor(*m, source))
        .collect()
}

fn anemic_metrics(class: Node, source: &[u8], path: &str) -> ClassMetrics {
    let fields = count_fields(class);
    let candidates = candidate_methods(class, source);
    let behavior = candidates
        .iter()
        .filter(|m| {
            m.child_by_field_name("body")
                .map(has_logic)
                .unwrap_or(false)
        })
        .count();

    let denom = fields + behavior;
    let dbsi = if denom > 0 {
        fields as f64 / denom as f64
    } else {
        0.0
    };
    let logic_density = if candidates.is_empty() {
        0.0
    } else {
        behavior as f64 / candidates.len() as f64
    };
    let orchestration = 1.0 - logic_density;

    ClassMetrics {
        file: path.to_string(),
        name: node_name(class, source).unwrap_or_else(|| "<unknown>".into()),
        fields,
        behavior_methods: behavior,
        dbsi,
        orchestration,
        ams: dbsi * orchestration,
        touch_count: 0,
    }
}

// ---------------------------------------------------------------------------
// God class
// ---------------------------------------------------------------------------

fn method_cyclomatic(method: Node) -> u64 {
    match method.child_by_field_name("body") {
        Some(body) => 1 + count_decisions(body).0,
        None => 1,
    }
}

/// `this.field` reads/writes inside one method body.
fn field_accesses(method: Node, source: &[u8]) -> FxHashSet<String> {
    let mut fields = FxHashSet::default();
    let Some(body) = method.child_by_field_name("body") else {
        return fields;
    };
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        if node.kind() == "field_access" {
            let object = node.child_by_field_name("object");
            let field = node.child_by_field_name("field");
            if let (Some(obj), Some(f)) = (object, field) {
                if obj.utf8_text(source) == Ok("this") {
                    if let Ok(name) = f.utf8_text(source) {
                        fields.insert(name.to_string());
                    }
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    fields
}

fn tight_class_cohesion(candidates: &[Node], source: &[u8]) -> f64 {
    if candidates.len() <= 1 {
        return 1.0;
    }
    let access: Vec<FxHashSet<String>> = candidates
        .iter()
        .map(|m| field_accesses(*m, source))
        .collect();

    let mut qualifying = 0usize;
    let mut connected = 0usize;
    for i in 0..access.len() {
        for j in (i + 1)..access.len() {
            if access[i].is_empty() || access[j].is_empty() {
                continue;
            }
            qualifying += 1;
            if access[i].intersection(&access[j]).next().is_some() {
                connected += 1;
            }
        }
    }
    if qualifying == 0 {
        1.0
    } else {
        connected as f64 / qualifying as f64
    }
}

fn god_candidate(class: Node, source: &[u8]) -> GodCandidate {
    let candidates = candidate_methods(class, source);
    let wmc: u64 = methods_of(class).iter().map(|m| method_cyclomatic(*m)).sum();

    GodCandidate {
        name: node_name(class, source).unwrap_or_else(|| "<unknown>".into()),
        method_count: candidates.len(),
        field_count: count_fields(class),
        wmc,
        tcc: tight_class_cohesion(&candidates, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_complexity_counts_java_decisions() {
        let source = r#"
class Service {
    int route(int x, boolean a, boolean b) {
        if (a && b) {
            for (int i = 0; i < x; i++) {
                x--;
            }
        }
        try {
            return x;
        } catch (Exception e) {
            return 0;
        }
    }
}
"#;
        let summary = analyze_source(source, "Service.java");
        assert_eq!(summary.functions.len(), 1);
        let f = &summary.functions[0];
        assert_eq!(f.name, "Service.route");
        // if + && + for + catch = 4 decisions
        assert_eq!(f.cyclomatic, 5);
        assert_eq!(f.branches, 1);
        assert_eq!(f.except_paths, 1);
        assert_eq!(f.max_nesting, 2);
    }

    #[test]
    fn cognitive_rewards_flat_code() {
        let nested = r#"
class A {
    void f(boolean a, boolean b) {
        if (a) {
            if (b) {
                g();
            }
        }
    }
}
"#;
        let summary = analyze_source(nested, "A.java");
        // 1 for outer if, 2 for the nested one.
        assert_eq!(summary.functions[0].cognitive, 3);
    }

    #[test]
    fn anemic_java_bean_scores_high() {
        let source = r#"
class Account {
    private int balance;
    private String owner;

    int getBalance() {
        return balance;
    }

    void setOwner(String owner) {
        this.owner = owner;
    }
}
"#;
        let summary = analyze_source(source, "Account.java");
        let account = &summary.classes[0];
        assert_eq!(account.fields, 2);
        assert_eq!(account.behavior_methods, 0);
        assert_eq!(account.ams, 1.0);
    }

    #[test]
    fn record_parameters_count_as_fields() {
        let source = "record Point(int x, int y) {}\n";
        let summary = analyze_source(source, "Point.java");
        assert_eq!(summary.classes[0].fields, 2);
    }

    #[test]
    fn shared_field_access_raises_tcc() {
        let source = r#"
class Wallet {
    private int balance;

    void credit(int amount) {
        this.balance = this.balance + amount;
    }

    int report() {
        return this.balance;
    }
}
"#;
        let summary = analyze_source(source, "Wallet.java");
        assert_eq!(summary.god_candidates[0].tcc, 1.0);
    }

    #[test]
    fn imports_capture_class_names() {
        let source = "import java.util.List;\nimport static org.acme.Util.helper;\n\nclass A {}\n";
        let summary = analyze_source(source, "A.java");
        assert!(summary.imports.contains(&"List".to_string()));
        assert!(summary.imports.contains(&"helper".to_string()));
    }

    #[test]
    fn broken_source_yields_empty_summary() {
        let summary = analyze_source("class {{{", "Broken.java");
        assert!(summary.functions.is_empty());
        assert!(summary.classes.is_empty());
    }
}
