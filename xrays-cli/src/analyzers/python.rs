//! Python front-end built on rustpython-parser.
//!
//! Reports only top-level functions and direct class methods; nested
//! definitions contribute to their parent's counts but never appear as rows.
//! Files that fail to parse yield an empty summary rather than an error.

use line_numbers::LinePositions;
use rustc_hash::FxHashSet;
use rustpython_parser::ast::{self, ExceptHandler, Expr, Ranged, Stmt};
use rustpython_parser::text_size::{TextRange, TextSize};
use rustpython_parser::{parse, Mode};
use tracing::debug;

use crate::analyzers::{FileAst, GodCandidate};
use crate::models::{ClassMetrics, FunctionComplexity};

pub fn analyze_source(source: &str, path: &str) -> FileAst {
    let module = match parse(source, Mode::Module, path) {
        Ok(ast::Mod::Module(m)) => m,
        Ok(_) => return empty(path),
        Err(e) => {
            debug!(%path, error = %e, "python parse failed");
            return empty(path);
        }
    };

    let positions = LinePositions::from(source);
    let mut out = FileAst {
        path: path.to_string(),
        ..FileAst::default()
    };

    for stmt in &module.body {
        match stmt {
            Stmt::FunctionDef(f) => out.functions.push(function_complexity(
                f.name.as_str(),
                &f.body,
                f.range(),
                &positions,
                path,
            )),
            Stmt::AsyncFunctionDef(f) => out.functions.push(function_complexity(
                f.name.as_str(),
                &f.body,
                f.range(),
                &positions,
                path,
            )),
            Stmt::ClassDef(class) => {
                for item in &class.body {
                    match item {
                        Stmt::FunctionDef(m) => out.functions.push(function_complexity(
                            &format!("{}.{}", class.name, m.name),
                            &m.body,
                            m.range(),
                            &positions,
                            path,
                        )),
                        Stmt::AsyncFunctionDef(m) => out.functions.push(function_complexity(
                            &format!("{}.{}", class.name, m.name),
                            &m.body,
                            m.range(),
                            &positions,
                            path,
                        )),
                        _ => {}
                    }
                }
                out.classes.push(anemic_metrics(class, path));
                out.god_candidates.push(god_candidate(class));
            }
            _ => {}
        }
    }

    out.imports = collect_imports(&module.body);
    out
}

fn empty(path: &str) -> FileAst {
    FileAst {
        path: path.to_string(),
        ..FileAst::default()
    }
}

fn line_of(offset: TextSize, positions: &LinePositions) -> u32 {
    positions.from_offset(u32::from(offset) as usize).as_usize() as u32 + 1
}

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

fn function_complexity(
    name: &str,
    body: &[Stmt],
    range: TextRange,
    positions: &LinePositions,
    path: &str,
) -> FunctionComplexity {
    let mut counts = DecisionCounts::default();
    for stmt in body {
        count_decisions(stmt, &mut counts);
    }
    let start = line_of(range.start(), positions);
    // The range ends just past the final token.
    let end_offset = u32::from(range.end()).saturating_sub(1);
    let end = positions.from_offset(end_offset as usize).as_usize() as u32 + 1;

    FunctionComplexity {
        file: path.to_string(),
        name: name.to_string(),
        line: start,
        cyclomatic: 1 + counts.decisions,
        cognitive: cognitive_of(body, 0),
        max_nesting: max_nesting(body, 0),
        branches: counts.branches,
        except_paths: counts.excepts,
        length: end.saturating_sub(start) + 1,
    }
}

#[derive(Default)]
struct DecisionCounts {
    decisions: u64,
    branches: u64,
    excepts: u64,
}

/// Full walk: nested definitions and lambdas count toward the enclosing
/// function, matching a flat AST traversal.
fn count_decisions(stmt: &Stmt, counts: &mut DecisionCounts) {
    match stmt {
        Stmt::If(s) => {
            counts.decisions += 1;
            counts.branches += 1;
            count_expr(&s.test, counts);
            walk(&s.body, counts);
            walk(&s.orelse, counts);
        }
        Stmt::While(s) => {
            counts.decisions += 1;
            count_expr(&s.test, counts);
            walk(&s.body, counts);
            walk(&s.orelse, counts);
        }
        Stmt::For(s) => {
            counts.decisions += 1;
            count_expr(&s.iter, counts);
            walk(&s.body, counts);
            walk(&s.orelse, counts);
        }
        Stmt::AsyncFor(s) => {
            counts.decisions += 1;
            count_expr(&s.iter, counts);
            walk(&s.body, counts);
            walk(&s.orelse, counts);
        }
        Stmt::Try(s) => {
            walk(&s.body, counts);
            for handler in &s.handlers {
                let ExceptHandler::ExceptHandler(h) = handler;
                counts.decisions += 1;
                counts.excepts += 1;
                walk(&h.body, counts);
            }
            walk(&s.orelse, counts);
            walk(&s.finalbody, counts);
        }
        Stmt::TryStar(s) => {
            walk(&s.body, counts);
            for handler in &s.handlers {
                let ExceptHandler::ExceptHandler(h) = handler;
                counts.decisions += 1;
                counts.excepts += 1;
                walk(&h.body, counts);
            }
            walk(&s.orelse, counts);
            walk(&s.finalbody, counts);
        }
        Stmt::Assert(s) => {
            counts.decisions += 1;
            count_expr(&s.test, counts);
        }
        _ => walk_other(stmt, counts),
    }
}

fn walk(body: &[Stmt], counts: &mut DecisionCounts) {
    for stmt in body {
        count_decisions(stmt, counts);
    }
}

fn walk_other(stmt: &Stmt, counts: &mut DecisionCounts) {
    match stmt {
        Stmt::With(s) => {
            for item in &s.items {
                count_expr(&item.context_expr, counts);
            }
            walk(&s.body, counts);
        }
        Stmt::AsyncWith(s) => {
            for item in &s.items {
                count_expr(&item.context_expr, counts);
            }
            walk(&s.body, counts);
        }
        Stmt::Match(s) => {
            count_expr(&s.subject, counts);
            for case in &s.cases {
                if let Some(guard) = &case.guard {
                    count_expr(guard, counts);
                }
                walk(&case.body, counts);
            }
        }
        Stmt::FunctionDef(f) => walk(&f.body, counts),
        Stmt::AsyncFunctionDef(f) => walk(&f.body, counts),
        Stmt::ClassDef(c) => walk(&c.body, counts),
        Stmt::Return(s) => {
            if let Some(v) = &s.value {
                count_expr(v, counts);
            }
        }
        Stmt::Expr(s) => count_expr(&s.value, counts),
        Stmt::Assign(s) => count_expr(&s.value, counts),
        Stmt::AugAssign(s) => count_expr(&s.value, counts),
        Stmt::AnnAssign(s) => {
            if let Some(v) = &s.value {
                count_expr(v, counts);
            }
        }
        Stmt::Raise(s) => {
            if let Some(e) = &s.exc {
                count_expr(e, counts);
            }
        }
        Stmt::Delete(s) => {
            for t in &s.targets {
                count_expr(t, counts);
            }
        }
        _ => {}
    }
}

fn count_expr(expr: &Expr, counts: &mut DecisionCounts) {
    match expr {
        Expr::BoolOp(e) => {
            counts.decisions += e.values.len().saturating_sub(1) as u64;
        }
        Expr::IfExp(_) => counts.decisions += 1,
        _ => {}
    }
    for child in child_exprs(expr) {
        count_expr(child, counts);
    }
}

/// Child expressions of an expression node, for pre-order walks.
fn child_exprs(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::BoolOp(e) => e.values.iter().collect(),
        Expr::NamedExpr(e) => vec![&e.target, &e.value],
        Expr::BinOp(e) => vec![&e.left, &e.right],
        Expr::UnaryOp(e) => vec![&e.operand],
        Expr::Lambda(e) => vec![&e.body],
        Expr::IfExp(e) => vec![&e.test, &e.body, &e.orelse],
        Expr::Dict(e) => e
            .keys
            .iter()
            .flatten()
            .chain(e.values.iter())
            .collect(),
        Expr::Set(e) => e.elts.iter().collect(),
        Expr::ListComp(e) => comp_children(&e.elt, &e.generators),
        Expr::SetComp(e) => comp_children(&e.elt, &e.generators),
        Expr::GeneratorExp(e) => comp_children(&e.elt, &e.generators),
        Expr::DictComp(e) => {
            let mut children = vec![e.key.as_ref(), e.value.as_ref()];
            for g in &e.generators {
                children.push(&g.target);
                children.push(&g.iter);
                children.extend(g.ifs.iter());
            }
            children
        }
        Expr::Await(e) => vec![&e.value],
        Expr::Yield(e) => e.value.iter().map(|v| v.as_ref()).collect(),
        Expr::YieldFrom(e) => vec![&e.value],
        Expr::Compare(e) => std::iter::once(e.left.as_ref())
            .chain(e.comparators.iter())
            .collect(),
        Expr::Call(e) => std::iter::once(e.func.as_ref())
            .chain(e.args.iter())
            .chain(e.keywords.iter().map(|k| &k.value))
            .collect(),
        Expr::FormattedValue(e) => vec![&e.value],
        Expr::JoinedStr(e) => e.values.iter().collect(),
        Expr::Attribute(e) => vec![&e.value],
        Expr::Subscript(e) => vec![&e.value, &e.slice],
        Expr::Starred(e) => vec![&e.value],
        Expr::List(e) => e.elts.iter().collect(),
        Expr::Tuple(e) => e.elts.iter().collect(),
        Expr::Slice(e) => e
            .lower
            .iter()
            .chain(e.upper.iter())
            .chain(e.step.iter())
            .map(|v| v.as_ref())
            .collect(),
        _ => Vec::new(),
    }
}

fn comp_children<'a>(
    elt: &'a Expr,
    generators: &'a [ast::Comprehension],
) -> Vec<&'a Expr> {
    let mut children = vec![elt];
    for g in generators {
        children.push(&g.target);
        children.push(&g.iter);
        children.extend(g.ifs.iter());
    }
    children
}

/// Deepest static nesting of conditionals / loops / with / try. Non-nesting
/// statements (including nested definitions) are not entered.
fn max_nesting(body: &[Stmt], depth: u32) -> u32 {
    let mut max = depth;
    for stmt in body {
        let sub_bodies: Vec<&[Stmt]> = match stmt {
            Stmt::If(s) => vec![&s.body, &s.orelse],
            Stmt::While(s) => vec![&s.body, &s.orelse],
            Stmt::For(s) => vec![&s.body, &s.orelse],
            Stmt::AsyncFor(s) => vec![&s.body, &s.orelse],
            Stmt::With(s) => vec![&s.body],
            Stmt::AsyncWith(s) => vec![&s.body],
            Stmt::Try(s) => {
                let mut bodies: Vec<&[Stmt]> = vec![&s.body, &s.orelse, &s.finalbody];
                for handler in &s.handlers {
                    let ExceptHandler::ExceptHandler(h) = handler;
                    bodies.push(&h.body);
                }
                bodies
            }
            _ => continue,
        };
        for sub in sub_bodies {
            max = max.max(max_nesting(sub, depth + 1));
        }
    }
    max
}

/// Cognitive complexity, SonarSource-shaped: control flow costs 1 + nesting,
/// `elif`/`else` arms cost a flat 1, every boolean-operator sequence costs 1.
/// Nested definitions are not entered.
fn cognitive_of(body: &[Stmt], nesting: u64) -> u64 {
    let mut total = 0u64;
    for stmt in body {
        match stmt {
            Stmt::If(s) => total += cognitive_if(s, nesting, false),
            Stmt::While(s) => {
                total += 1 + nesting + bool_sequences(&s.test);
                total += cognitive_of(&s.body, nesting + 1);
                if !s.orelse.is_empty() {
                    total += 1 + cognitive_of(&s.orelse, nesting + 1);
                }
            }
            Stmt::For(s) => {
                total += 1 + nesting;
                total += cognitive_of(&s.body, nesting + 1);
                if !s.orelse.is_empty() {
                    total += 1 + cognitive_of(&s.orelse, nesting + 1);
                }
            }
            Stmt::AsyncFor(s) => {
                total += 1 + nesting;
                total += cognitive_of(&s.body, nesting + 1);
                if !s.orelse.is_empty() {
                    total += 1 + cognitive_of(&s.orelse, nesting + 1);
                }
            }
            Stmt::Try(s) => {
                total += cognitive_of(&s.body, nesting);
                for handler in &s.handlers {
                    let ExceptHandler::ExceptHandler(h) = handler;
                    total += 1 + nesting + cognitive_of(&h.body, nesting + 1);
                }
                total += cognitive_of(&s.orelse, nesting);
                total += cognitive_of(&s.finalbody, nesting);
            }
            Stmt::With(s) => total += cognitive_of(&s.body, nesting),
            Stmt::AsyncWith(s) => total += cognitive_of(&s.body, nesting),
            Stmt::Match(s) => {
                total += 1 + nesting;
                for case in &s.cases {
                    total += cognitive_of(&case.body, nesting + 1);
                }
            }
            Stmt::FunctionDef(_) | Stmt::AsyncFunctionDef(_) | Stmt::ClassDef(_) => {}
            Stmt::Return(s) => {
                if let Some(v) = &s.value {
                    total += cognitive_expr(v, nesting);
                }
            }
            Stmt::Expr(s) => total += cognitive_expr(&s.value, nesting),
            Stmt::Assign(s) => total += cognitive_expr(&s.value, nesting),
            Stmt::AugAssign(s) => total += cognitive_expr(&s.value, nesting),
            Stmt::AnnAssign(s) => {
                if let Some(v) = &s.value {
                    total += cognitive_expr(v, nesting);
                }
            }
            Stmt::Assert(s) => total += bool_sequences(&s.test),
            _ => {}
        }
    }
    total
}

fn cognitive_if(s: &ast::StmtIf, nesting: u64, as_elif: bool) -> u64 {
    let mut total = if as_elif { 1 } else { 1 + nesting };
    total += bool_sequences(&s.test);
    total += cognitive_of(&s.body, nesting + 1);
    match s.orelse.as_slice() {
        [] => {}
        [Stmt::If(inner)] => total += cognitive_if(inner, nesting, true),
        other => {
            total += 1;
            total += cognitive_of(other, nesting + 1);
        }
    }
    total
}

fn cognitive_expr(expr: &Expr, nesting: u64) -> u64 {
    let mut total = bool_sequences(expr);
    if let Expr::IfExp(_) = expr {
        total += nesting; // the sequence count already charged the +1
    }
    total
}

/// One point per boolean-operator sequence; alternating operators create new
/// sequences (the parser flattens same-operator chains into one node).
/// Ternaries inside the expression count once each.
fn bool_sequences(expr: &Expr) -> u64 {
    let mut total = 0u64;
    if matches!(expr, Expr::BoolOp(_) | Expr::IfExp(_)) {
        total += 1;
    }
    for child in child_exprs(expr) {
        total += bool_sequences(child);
    }
    total
}

// ---------------------------------------------------------------------------
// Anemic model
// ---------------------------------------------------------------------------

fn is_dunder(name: &str) -> bool {
    name.starts_with("__") && name.ends_with("__")
}

fn is_property(decorators: &[Expr]) -> bool {
    decorators.iter().any(|d| {
        matches!(d, Expr::Name(n) if n.id.as_str() == "property")
    })
}

/// Declared class attributes plus `self.x` assignments in the constructor.
fn count_fields(class: &ast::StmtClassDef) -> usize {
    let mut names: FxHashSet<String> = FxHashSet::default();
    for child in &class.body {
        match child {
            Stmt::Assign(a) => {
                for target in &a.targets {
                    if let Expr::Name(n) = target {
                        names.insert(n.id.to_string());
                    }
                }
            }
            Stmt::AnnAssign(a) => {
                if let Expr::Name(n) = a.target.as_ref() {
                    names.insert(n.id.to_string());
                }
            }
            Stmt::FunctionDef(f) if f.name.as_str() == "__init__" => {
                collect_self_assignments(&f.body, &mut names);
            }
            _ => {}
        }
    }
    names.len()
}

fn collect_self_assignments(body: &[Stmt], names: &mut FxHashSet<String>) {
    for stmt in body {
        if let Stmt::Assign(a) = stmt {
            for target in &a.targets {
                if let Expr::Attribute(attr) = target {
                    if let Expr::Name(obj) = attr.value.as_ref() {
                        if obj.id.as_str() == "self" {
                            names.insert(attr.attr.to_string());
                        }
                    }
                }
            }
        }
        // Constructors branch on arguments often enough to matter.
        for sub in stmt_bodies(stmt) {
            collect_self_assignments(sub, names);
        }
    }
}

fn stmt_bodies(stmt: &Stmt) -> Vec<&[Stmt]> {
    match stmt {
        Stmt::If(s) => vec![&s.body, &s.orelse],
        Stmt::While(s) => vec![&s.body, &s.orelse],
        Stmt::For(s) => vec![&s.body, &s.orelse],
        Stmt::AsyncFor(s) => vec![&s.body, &s.orelse],
        Stmt::With(s) => vec![&s.body],
        Stmt::AsyncWith(s) => vec![&s.body],
        Stmt::Try(s) => {
            let mut bodies: Vec<&[Stmt]> = vec![&s.body, &s.orelse, &s.finalbody];
            for handler in &s.handlers {
                let ExceptHandler::ExceptHandler(h) = handler;
                bodies.push(&h.body);
            }
            bodies
        }
        _ => Vec::new(),
    }
}

fn has_logic(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| {
        matches!(
            stmt,
            Stmt::If(_)
                | Stmt::While(_)
                | Stmt::For(_)
                | Stmt::AsyncFor(_)
                | Stmt::Try(_)
                | Stmt::TryStar(_)
                | Stmt::With(_)
                | Stmt::AsyncWith(_)
                | Stmt::Match(_)
        ) || stmt_bodies(stmt).iter().any(|b| has_logic(b))
    })
}

struct Method<'a> {
    name: &'a str,
    decorators: &'a [Expr],
    body: &'a [Stmt],
}

fn direct_methods(class: &ast::StmtClassDef) -> Vec<Method<'_>> {
    class
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::FunctionDef(f) => Some(Method {
                name: f.name.as_str(),
                decorators: &f.decorator_list,
                body: &f.body,
            }),
            Stmt::AsyncFunctionDef(f) => Some(Method {
                name: f.name.as_str(),
                decorators: &f.decorator_list,
                body: &f.body,
            }),
            _ => None,
        })
        .collect()
}

fn anemic_metrics(class: &ast::StmtClassDef, path: &str) -> ClassMetrics {
    let fields = count_fields(class);
    let methods = direct_methods(class);
    let candidates: Vec<&Method> = methods
        .iter()
        .filter(|m| !is_dunder(m.name) && !is_property(m.decorators))
        .collect();
    let behavior = candidates.iter().filter(|m| has_logic(m.body)).count();

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
        name: class.name.to_string(),
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

fn method_cyclomatic(body: &[Stmt]) -> u64 {
    let mut counts = DecisionCounts::default();
    for stmt in body {
        count_decisions(stmt, &mut counts);
    }
    1 + counts.decisions
}

fn field_accesses(body: &[Stmt], fields: &mut FxHashSet<String>) {
    fn visit_expr(expr: &Expr, fields: &mut FxHashSet<String>) {
        if let Expr::Attribute(attr) = expr {
            if let Expr::Name(obj) = attr.value.as_ref() {
                if obj.id.as_str() == "self" {
                    fields.insert(attr.attr.to_string());
                }
            }
        }
        for child in child_exprs(expr) {
            visit_expr(child, fields);
        }
    }

    for stmt in body {
        match stmt {
            Stmt::If(s) => {
                visit_expr(&s.test, fields);
            }
            Stmt::While(s) => visit_expr(&s.test, fields),
            Stmt::For(s) => {
                visit_expr(&s.target, fields);
                visit_expr(&s.iter, fields);
            }
            Stmt::AsyncFor(s) => {
                visit_expr(&s.target, fields);
                visit_expr(&s.iter, fields);
            }
            Stmt::Return(s) => {
                if let Some(v) = &s.value {
                    visit_expr(v, fields);
                }
            }
            Stmt::Expr(s) => visit_expr(&s.value, fields),
            Stmt::Assign(s) => {
                for t in &s.targets {
                    visit_expr(t, fields);
                }
                visit_expr(&s.value, fields);
            }
            Stmt::AugAssign(s) => {
                visit_expr(&s.target, fields);
                visit_expr(&s.value, fields);
            }
            Stmt::AnnAssign(s) => {
                visit_expr(&s.target, fields);
                if let Some(v) = &s.value {
                    visit_expr(v, fields);
                }
            }
            Stmt::Raise(s) => {
                if let Some(e) = &s.exc {
                    visit_expr(e, fields);
                }
            }
            Stmt::Assert(s) => visit_expr(&s.test, fields),
            _ => {}
        }
        for sub in stmt_bodies(stmt) {
            field_accesses(sub, fields);
        }
    }
}

/// TCC over candidate methods: the share of qualifying pairs (both members
/// touch at least one field) that share a field. No qualifying pair: 1.0.
fn tight_class_cohesion(methods: &[&Method<'_>]) -> f64 {
    if methods.len() <= 1 {
        return 1.0;
    }
    let access: Vec<FxHashSet<String>> = methods
        .iter()
        .map(|m| {
            let mut fields = FxHashSet::default();
            field_accesses(m.body, &mut fields);
            fields
        })
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

fn god_candidate(class: &ast::StmtClassDef) -> GodCandidate {
    let methods = direct_methods(class);
    let candidates: Vec<&Method> = methods
        .iter()
        .filter(|m| !is_dunder(m.name) && !is_property(m.decorators))
        .collect();
    let wmc: u64 = methods.iter().map(|m| method_cyclomatic(m.body)).sum();

    GodCandidate {
        name: class.name.to_string(),
        method_count: candidates.len(),
        field_count: count_fields(class),
        wmc,
        tcc: tight_class_cohesion(&candidates),
    }
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

fn collect_imports(body: &[Stmt]) -> Vec<String> {
    let mut modules: FxHashSet<String> = FxHashSet::default();
    collect_imports_into(body, &mut modules);
    let mut out: Vec<String> = modules.into_iter().collect();
    out.sort();
    out
}

fn collect_imports_into(body: &[Stmt], modules: &mut FxHashSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Import(s) => {
                for alias in &s.names {
                    if let Some(first) = alias.name.as_str().split('.').next() {
                        modules.insert(first.to_string());
                    }
                }
            }
            Stmt::ImportFrom(s) => {
                if let Some(module) = &s.module {
                    if let Some(first) = module.as_str().split('.').next() {
                        modules.insert(first.to_string());
                    }
                }
            }
            Stmt::FunctionDef(f) => collect_imports_into(&f.body, modules),
            Stmt::AsyncFunctionDef(f) => collect_imports_into(&f.body, modules),
            Stmt::ClassDef(c) => collect_imports_into(&c.body, modules),
            _ => {
                for sub in stmt_bodies(stmt) {
                    collect_imports_into(sub, modules);
                }
            }
        }
    }
}
