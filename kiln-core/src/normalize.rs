//! Source normalization before bytecode compilation.
//!
//! Two tree-sitter based rewrites over chunk source:
//!
//! - **Arrow-function normalization**: rewrites arrow function expressions
//!   into plain `function` expressions. The target runtime's bytecode
//!   interpreter crashes executing async arrow functions from cache data;
//!   rewriting sidesteps the defect.
//! - **String protection**: replaces configured string literals with
//!   `String.fromCharCode(...)` call sites so they never appear as plain
//!   text in the shipped bundle.
//!
//! An arrow function is only rewritten when the rewrite preserves meaning.
//! Arrows capture `this`, `arguments`, `super`, and `new.target` lexically;
//! a plain function rebinds them. If an arrow's own body (or its parameter
//! defaults) references one of these, the chunk fails with
//! [`KilnError::UnsupportedSyntax`] instead of silently corrupting behavior.

use tree_sitter::{Node, Parser, Tree};

use crate::error::{KilnError, Result};

/// Node kinds that open a fresh `this`/`arguments` binding. The capture
/// check does not descend past these.
const FUNCTION_BOUNDARY_KINDS: &[&str] = &[
    "function",
    "function_expression",
    "function_declaration",
    "generator_function",
    "generator_function_declaration",
    "method_definition",
    "class_declaration",
    "class",
];

fn parse(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_javascript::LANGUAGE.into())
        .ok()?;
    parser.parse(source, None)
}

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

fn start_line(node: &Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn collect_by_kind<'a>(root: Node<'a>, kind: &str, out: &mut Vec<Node<'a>>) {
    if root.kind() == kind {
        out.push(root);
    }
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        collect_by_kind(child, kind, out);
    }
}

/// Whether the source contains an async arrow function.
///
/// Used as a regression guard: when arrow-function transformation is
/// disabled, the caller warns about the documented bytecode-interpreter
/// crash instead of proceeding silently.
pub fn contains_async_arrow(source: &str) -> bool {
    let Some(tree) = parse(source) else {
        return false;
    };
    let mut arrows = Vec::new();
    collect_by_kind(tree.root_node(), "arrow_function", &mut arrows);
    arrows.iter().any(is_async)
}

fn is_async(node: &Node) -> bool {
    node.child(0).map(|c| c.kind() == "async").unwrap_or(false)
}

/// Reject constructs the rewrite would rebind. Descends the arrow's whole
/// subtree (parameter defaults included) but stops at nested non-arrow
/// functions, which carry their own bindings.
fn check_capture_free(chunk: &str, source: &str, node: Node) -> Result<()> {
    let construct = match node.kind() {
        "this" => Some("this"),
        "super" => Some("super"),
        "identifier" if node_text(&node, source) == "arguments" => Some("arguments"),
        "member_expression" if node_text(&node, source) == "new.target" => Some("new.target"),
        _ => None,
    };
    if let Some(construct) = construct {
        return Err(KilnError::UnsupportedSyntax {
            chunk: chunk.to_string(),
            construct: construct.to_string(),
            line: start_line(&node),
        });
    }

    if FUNCTION_BOUNDARY_KINDS.contains(&node.kind()) {
        return Ok(());
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        check_capture_free(chunk, source, child)?;
    }
    Ok(())
}

/// Build the `function` expression replacing one arrow node.
fn replacement_for(chunk: &str, source: &str, arrow: Node) -> Result<String> {
    let mut cursor = arrow.walk();
    for child in arrow.children(&mut cursor) {
        check_capture_free(chunk, source, child)?;
    }

    let params = if let Some(p) = arrow.child_by_field_name("parameters") {
        node_text(&p, source).to_string()
    } else if let Some(p) = arrow.child_by_field_name("parameter") {
        format!("({})", node_text(&p, source))
    } else {
        "()".to_string()
    };

    let body = arrow.child_by_field_name("body").ok_or_else(|| KilnError::Compile {
        chunk: chunk.to_string(),
        message: format!("arrow function without body at line {}", start_line(&arrow)),
    })?;

    let body_text = if body.kind() == "statement_block" {
        node_text(&body, source).to_string()
    } else {
        // Expression body. Object literals and sequence expressions are
        // already parenthesized in the source, so `return <expr>;` is safe.
        format!("{{ return {}; }}", node_text(&body, source))
    };

    let async_kw = if is_async(&arrow) { "async " } else { "" };
    Ok(format!("{}function {} {}", async_kw, params, body_text))
}

/// Rewrite every arrow function expression into an equivalent standard
/// function expression.
///
/// Rewrites are applied innermost-first and the source re-parsed between
/// edits, so nested arrows compose correctly. Each pass removes exactly one
/// arrow and introduces none, so the loop terminates.
pub fn rewrite_arrow_functions(chunk: &str, source: &str) -> Result<String> {
    let mut src = source.to_string();
    loop {
        let tree = parse(&src).ok_or_else(|| KilnError::Compile {
            chunk: chunk.to_string(),
            message: "tree-sitter failed to parse chunk source".to_string(),
        })?;

        let mut arrows = Vec::new();
        collect_by_kind(tree.root_node(), "arrow_function", &mut arrows);

        // The arrow with the greatest start byte has no arrow descendants:
        // every descendant starts strictly later than its ancestor.
        let Some(arrow) = arrows.into_iter().max_by_key(|n| n.start_byte()) else {
            return Ok(src);
        };

        let replacement = replacement_for(chunk, &src, arrow)?;
        src.replace_range(arrow.start_byte()..arrow.end_byte(), &replacement);
    }
}

/// Replace configured string literals with `String.fromCharCode(...)`.
///
/// Only plain `'...'` / `"..."` literals with an exact content match are
/// rewritten. Literals containing escape sequences and template strings are
/// left alone: their raw text differs from their runtime value.
pub fn protect_strings(source: &str, protected: &[String]) -> String {
    let targets: Vec<&String> = protected.iter().filter(|s| !s.is_empty()).collect();
    if targets.is_empty() {
        return source.to_string();
    }

    let Some(tree) = parse(source) else {
        tracing::debug!("string protection skipped: source did not parse");
        return source.to_string();
    };

    let mut strings = Vec::new();
    collect_by_kind(tree.root_node(), "string", &mut strings);

    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    for node in strings {
        let Some(fragment) = sole_fragment(node) else {
            continue;
        };
        let content = node_text(&fragment, source);
        if !targets.iter().any(|t| t.as_str() == content) {
            continue;
        }
        // Module specifiers must stay literal for the resolver.
        if is_module_specifier(node) {
            continue;
        }
        let codes: Vec<String> = content
            .encode_utf16()
            .map(|u| u.to_string())
            .collect();
        let call = format!("String.fromCharCode({})", codes.join(","));
        // A literal in property-key position needs computed-key brackets.
        let replacement = if is_property_key(node) {
            format!("[{call}]")
        } else {
            call
        };
        edits.push((node.start_byte(), node.end_byte(), replacement));
    }

    // Apply back-to-front so earlier offsets stay valid.
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = source.to_string();
    for (start, end, replacement) in edits {
        out.replace_range(start..end, &replacement);
    }
    out
}

/// Whether a string node names an object property, class member, or method.
fn is_property_key(node: Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    let field = match parent.kind() {
        "pair" | "pair_pattern" => "key",
        "method_definition" | "field_definition" => "name",
        _ => return false,
    };
    parent.child_by_field_name(field) == Some(node)
}

/// Whether a string node is the source of an import or export statement.
fn is_module_specifier(node: Node) -> bool {
    node.parent()
        .map(|p| matches!(p.kind(), "import_statement" | "export_statement"))
        .unwrap_or(false)
}

/// The single `string_fragment` of a plain literal, or `None` when the
/// literal is empty or contains escape sequences.
fn sole_fragment(node: Node) -> Option<Node> {
    let mut fragment = None;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "string_fragment" => {
                if fragment.is_some() {
                    return None;
                }
                fragment = Some(child);
            }
            "escape_sequence" => return None,
            _ => {}
        }
    }
    fragment
}
