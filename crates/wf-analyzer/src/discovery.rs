//! Workflow discovery (§4.2): finds `createWorkflow(...)` definitions and
//! the invocations of the names they're bound to.

use std::collections::HashMap;

use tree_sitter::Node;
use wf_ir::Dep;
use wf_syntax::{Document, NodeExt as _};

/// One `createWorkflow(...)` definition found in a file.
///
/// The callback that implements a workflow isn't attached here: it comes
/// from a separate [`Invocation`] whose `workflow_name` matches
/// [`WorkflowDef::name`], since the definition and its invocation are
/// frequently two different call expressions (`export const wf =
/// createWorkflow(...)` vs. a later `wf(callback)`).
pub(crate) struct WorkflowDef {
    pub(crate) name: String,
    pub(crate) dependencies: Vec<Dep>,
    pub(crate) strict: bool,
    pub(crate) declared_errors: Option<Vec<String>>,
    pub(crate) description: Option<String>,
}

/// An invocation: a call to a known workflow name with a function-literal
/// first argument.
pub(crate) struct Invocation<'tree> {
    pub(crate) workflow_name: String,
    pub(crate) callback: Node<'tree>,
}

const RESERVED_OPTION_KEYS: &[&str] = &["strict", "errors", "id", "description", "markdown"];

/// Same-file `const X = tags('A', 'B')` bindings, resolved so that
/// `errors: X` is equivalent to `errors: ['A', 'B']` (§4.2, §6).
pub(crate) fn collect_tags_constants(doc: &Document) -> HashMap<String, Vec<String>> {
    let mut out = HashMap::new();

    for node in doc.walk() {
        if node.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = node.child_by_field_name("name") else {
            continue;
        };
        if name_node.kind() != "identifier" {
            continue;
        }
        let Some(value_node) = node.child_by_field_name("value") else {
            continue;
        };
        if value_node.kind() != "call_expression" {
            continue;
        }
        let Some(callee) = value_node.function_child() else {
            continue;
        };
        if doc.text(callee) != "tags" {
            continue;
        }
        let Some(args) = value_node.arguments_child() else {
            continue;
        };

        let values: Vec<String> = args
            .named_children_vec()
            .into_iter()
            .filter_map(|arg| string_literal(doc, arg))
            .collect();

        out.insert(doc.text(name_node).to_string(), values);
    }

    out
}

/// Pass 1: collect every `createWorkflow(...)` definition in the file.
pub(crate) fn collect_definitions(
    doc: &Document,
    tags: &HashMap<String, Vec<String>>,
) -> Vec<WorkflowDef> {
    let mut defs = Vec::new();

    for node in doc.walk() {
        if node.kind() != "call_expression" {
            continue;
        }
        let Some(callee) = node.function_child() else {
            continue;
        };
        if doc.text(callee) != "createWorkflow" {
            continue;
        }

        let name = enclosing_declarator_name(doc, node).unwrap_or_else(|| "<anonymous>".into());
        let Some(args) = node.arguments_child() else {
            continue;
        };
        let positional = args.named_children_vec();

        let mut dependencies = Vec::new();
        let mut strict = false;
        let mut declared_errors = None;
        let mut description = None;

        // The dependencies object is whichever positional argument (after
        // the name) is an `object`; options are the other one, if present.
        for arg in positional.iter().skip(1) {
            if arg.kind() != "object" {
                continue;
            }
            let pairs = object_pairs(doc, *arg);
            if pairs
                .iter()
                .any(|(k, _)| RESERVED_OPTION_KEYS.contains(&k.as_str()))
            {
                // This is the options object, not the deps object.
                for (key, value) in &pairs {
                    match key.as_str() {
                        "strict" => strict = doc.text(*value) == "true",
                        "errors" => declared_errors = resolve_string_array(doc, *value, tags),
                        "description" => description = string_literal(doc, *value),
                        _ => {}
                    }
                }
            } else {
                dependencies = pairs
                    .into_iter()
                    .map(|(name, value)| {
                        let mut dep = Dep::new(name);
                        dep.type_signature = type_annotation_text(doc, value);
                        dep.location = doc.span(value);
                        dep
                    })
                    .collect();
            }
        }

        defs.push(WorkflowDef {
            name,
            dependencies,
            strict,
            declared_errors,
            description,
        });
    }

    defs
}

/// Pass 2: collect invocations of known workflow names with a
/// function-literal first argument (§4.2).
pub(crate) fn collect_invocations<'tree>(
    doc: &'tree Document,
    known_names: &[String],
) -> Vec<Invocation<'tree>> {
    let mut invocations = Vec::new();

    for node in doc.walk() {
        if node.kind() != "call_expression" {
            continue;
        }
        let Some(callee) = node.function_child() else {
            continue;
        };
        let callee_text = doc.text(callee);

        let matches_known = known_names.iter().any(|n| n == callee_text);

        let Some(args) = node.arguments_child() else {
            continue;
        };
        let Some(first_arg) = args.named_children_vec().into_iter().next() else {
            continue;
        };
        let is_callback = matches!(first_arg.kind(), "arrow_function" | "function_expression");

        if !is_callback {
            continue;
        }

        // Secondary heuristic for cross-file references: a callback whose
        // parameter list mentions `step` or `deps` still looks like a
        // workflow invocation even if the callee name wasn't locally
        // defined by `createWorkflow`.
        let looks_like_callback = matches_known || callback_params_mention_step_or_deps(doc, first_arg);

        if !looks_like_callback {
            continue;
        }

        invocations.push(Invocation {
            workflow_name: callee_text.to_string(),
            callback: first_arg,
        });
    }

    invocations
}

fn callback_params_mention_step_or_deps(doc: &Document, callback: Node<'_>) -> bool {
    let Some(params) = callback.parameters_child() else {
        return false;
    };
    let text = doc.text(params);
    text.contains("step") || text.contains("deps")
}

fn enclosing_declarator_name(doc: &Document, mut node: Node<'_>) -> Option<String> {
    loop {
        node = node.parent()?;
        if node.kind() == "variable_declarator" {
            let name_node = node.child_by_field_name("name")?;
            return Some(doc.text(name_node).to_string());
        }
        if matches!(node.kind(), "statement_block" | "program") {
            return None;
        }
    }
}

/// Iterates an object literal's `pair`/shorthand properties as
/// `(key text, value node)`. For shorthand properties the value node is
/// the identifier itself.
pub(crate) fn object_pairs<'tree>(doc: &Document, object: Node<'tree>) -> Vec<(String, Node<'tree>)> {
    object
        .named_children_vec()
        .into_iter()
        .filter_map(|child| match child.kind() {
            "pair" => {
                let key = child.key_child()?;
                let value = child.value_child()?;
                Some((property_key_text(doc, key), value))
            }
            "shorthand_property_identifier" => Some((doc.text(child).to_string(), child)),
            _ => None,
        })
        .collect()
}

fn property_key_text(doc: &Document, key: Node<'_>) -> String {
    match key.kind() {
        "string" => string_literal(doc, key).unwrap_or_else(|| doc.text(key).to_string()),
        _ => doc.text(key).to_string(),
    }
}

/// A literal string, unquoted; for a no-substitution template string, the
/// contents verbatim. Returns `None` for anything with interpolation.
pub(crate) fn string_literal(doc: &Document, node: Node<'_>) -> Option<String> {
    match node.kind() {
        "string" => {
            let text = doc.text(node);
            Some(text[1..text.len() - 1].to_string())
        }
        "template_string" => {
            if node
                .named_children_vec()
                .iter()
                .any(|c| c.kind() == "template_substitution")
            {
                None
            } else {
                let text = doc.text(node);
                Some(text[1..text.len() - 1].to_string())
            }
        }
        _ => None,
    }
}

fn resolve_string_array(
    doc: &Document,
    node: Node<'_>,
    tags: &HashMap<String, Vec<String>>,
) -> Option<Vec<String>> {
    match node.kind() {
        "array" => Some(
            node.named_children_vec()
                .into_iter()
                .filter_map(|el| string_literal(doc, el))
                .collect(),
        ),
        "identifier" => tags.get(doc.text(node)).cloned(),
        "call_expression" => {
            let callee = node.function_child()?;
            if doc.text(callee) != "tags" {
                return None;
            }
            let args = node.arguments_child()?;
            Some(
                args.named_children_vec()
                    .into_iter()
                    .filter_map(|a| string_literal(doc, a))
                    .collect(),
            )
        }
        _ => None,
    }
}

fn type_annotation_text(doc: &Document, value: Node<'_>) -> Option<String> {
    // `value` here is typically an arrow function / identifier for a dep;
    // a `required_parameter`-shaped type annotation isn't present on
    // object-literal values, so we fall back to the raw source text,
    // which is good enough for display purposes.
    Some(doc.text(value).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_workflow_definition_name_and_deps() {
        let doc = Document::parse(
            "const checkout = createWorkflow('checkout', { charge: chargeFn, notify: notifyFn });",
        )
        .unwrap();
        let tags = collect_tags_constants(&doc);
        let defs = collect_definitions(&doc, &tags);

        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "checkout");
        assert_eq!(defs[0].dependencies.len(), 2);
        assert_eq!(defs[0].dependencies[0].name, "charge");
    }

    #[test]
    fn resolves_tags_constant_for_declared_errors() {
        let doc = Document::parse(
            "const cartErrors = tags('A', 'B'); const wf = createWorkflow('wf', {}, { errors: cartErrors });",
        )
        .unwrap();
        let tags = collect_tags_constants(&doc);
        let defs = collect_definitions(&doc, &tags);

        assert_eq!(
            defs[0].declared_errors,
            Some(vec!["A".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn collects_invocation_with_callback_literal() {
        let doc = Document::parse(
            "const wf = createWorkflow('wf', {}); wf((step, deps) => { step('a', () => 1); });",
        )
        .unwrap();
        let invocations = collect_invocations(&doc, &["wf".to_string()]);
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].workflow_name, "wf");
    }
}
