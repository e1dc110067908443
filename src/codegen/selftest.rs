//! Self-test emission
//!
//! Components may carry example literals under the examples key. For each
//! component that does, a vitest suite asserts that its validator accepts
//! every `valid` literal and rejects every `invalid` one.

use serde_json::Value;

use super::names::schema_const;
use super::validator::js_string;
use super::{CompileOutput, Section};

/// Render the vitest module for `output`, importing validators from
/// `module_path` (e.g. `./contracts`). `None` when no component has examples.
pub fn render_self_tests(output: &CompileOutput, module_path: &str) -> Option<String> {
    let mut suites: Vec<(String, String, &[Value], &[Value])> = Vec::new();
    for declaration in &output.declarations {
        if declaration.section != Section::Component {
            continue;
        }
        let Some(examples) = output
            .components
            .get(&declaration.name)
            .and_then(|node| node.examples.as_ref())
        else {
            continue;
        };
        if examples.valid.is_empty() && examples.invalid.is_empty() {
            continue;
        }
        suites.push((
            declaration.name.clone(),
            schema_const(&declaration.identifier),
            examples.valid.as_slice(),
            examples.invalid.as_slice(),
        ));
    }
    if suites.is_empty() {
        return None;
    }

    let mut lines = vec![
        "// This file was automatically generated from an API description.".to_string(),
        "// Do not manually edit this file.".to_string(),
        String::new(),
        "import { describe, expect, it } from \"vitest\";".to_string(),
    ];
    let constants: Vec<&str> = suites.iter().map(|(_, constant, _, _)| constant.as_str()).collect();
    lines.push(format!(
        "import {{ {} }} from {};",
        constants.join(", "),
        js_string(module_path)
    ));

    for (name, constant, valid, invalid) in &suites {
        lines.push(String::new());
        lines.push(format!("describe({}, () => {{", js_string(name)));
        if !valid.is_empty() {
            lines.extend(case("accepts valid examples", constant, valid, true));
        }
        if !invalid.is_empty() {
            lines.extend(case("rejects invalid examples", constant, invalid, false));
        }
        lines.push("});".to_string());
    }
    lines.push(String::new());

    tracing::debug!(suites = suites.len(), "self-tests rendered");
    Some(lines.join("\n"))
}

fn case(title: &str, constant: &str, examples: &[Value], success: bool) -> Vec<String> {
    let mut lines = vec![format!("  it({}, () => {{", js_string(title))];
    for example in examples {
        lines.push(format!(
            "    expect({}.safeParse({}).success).toBe({});",
            constant, example, success
        ));
    }
    lines.push("  });".to_string());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{compile, CompileOptions};
    use serde_json::json;

    #[test]
    fn test_suites_for_components_with_examples() {
        let output = compile(
            &json!({
                "components": {
                    "schemas": {
                        "Email": {
                            "type": "string",
                            "format": "email",
                            "x-contract-examples": { "valid": ["a@b.co"], "invalid": ["nope", 3] }
                        },
                        "Plain": { "type": "boolean" }
                    }
                }
            }),
            &CompileOptions::default(),
        )
        .unwrap();

        let rendered = render_self_tests(&output, "./contracts").unwrap();
        assert!(rendered.contains("import { EmailSchema } from \"./contracts\";"));
        assert!(rendered.contains("describe(\"Email\", () => {"));
        assert!(rendered.contains("    expect(EmailSchema.safeParse(\"a@b.co\").success).toBe(true);"));
        assert!(rendered.contains("    expect(EmailSchema.safeParse(3).success).toBe(false);"));
        assert!(!rendered.contains("Plain"));
    }

    #[test]
    fn test_no_examples_no_module() {
        let output = compile(
            &json!({ "components": { "schemas": { "Flag": { "type": "boolean" } } } }),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(render_self_tests(&output, "./contracts"), None);
    }
}
