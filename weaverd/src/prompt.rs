// ABOUTME: holds the instruction prompts sent to the model and a small placeholder renderer.
// ABOUTME: placeholders use the {{{name}}} form and are substituted verbatim in a single pass.

use weaver_common::ComparatorMode;

pub const STRUCTURE_TOOL_NAME: &str = "jsonStructureValidator";

pub const CONVERSION_TEMPLATE: &str = "You are a conversion expert. You will convert the given text into JSON format, strictly adhering to the provided JSON schema.

Text: {{{text}}}

Schema: {{{schema}}}

Output the converted JSON in jsonOutput as a string. Set isValid to true if the output matches the schema. Otherwise, set it to false.

Ensure that the generated JSON is valid and adheres to the schema.";

pub const CORRECTION_TEMPLATE: &str = r#"You are a text-to-JSON converter. Your job is to convert the given text into JSON that matches the provided {{{target_kind}}}.

CRITICAL INSTRUCTIONS:
1. Extract information from the text and create a JSON object
2. The JSON must match the {{{target_kind}}} provided below
3. Use the {{{tool}}} tool to check if your JSON matches, passing your JSON as jsonString and the target as targetStructure
4. If the tool reports a problem, fix the JSON and check again
5. Stop once the tool reports "{{{valid_verdict}}}" and return ONLY the final result in the required format

DO NOT:
- Return a schema template
- Return just "true" or "false"
- Return the input schema as output

MUST DO:
- Convert the text into actual data
- Match the structure exactly
- Return in this format:
{
  "correctedJson": "{\"actual\":\"data\",\"from\":\"text\"}",
  "validationResult": "{{{valid_verdict}}}"
}

Text to convert: {{{text}}}

Target {{{target_kind}}}: {{{schema}}}

Now convert the text to JSON matching this {{{target_kind}}}."#;

pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 3..];
        match after.find("}}}") {
            Some(end) => {
                let name = &after[..end];
                match vars.iter().find(|(k, _)| *k == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push_str("{{{");
                        out.push_str(name);
                        out.push_str("}}}");
                    }
                }
                rest = &after[end + 3..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn conversion_prompt(text: &str, schema: &str) -> String {
    render(CONVERSION_TEMPLATE, &[("text", text), ("schema", schema)])
}

pub fn correction_prompt(text: &str, schema: &str, mode: ComparatorMode) -> String {
    let (target_kind, valid_verdict) = match mode {
        ComparatorMode::KeySet => ("structure", weaver_common::compare::VALID_STRUCTURE),
        ComparatorMode::Schema => ("JSON schema", weaver_common::compare::VALID_JSON),
    };
    render(
        CORRECTION_TEMPLATE,
        &[
            ("text", text),
            ("schema", schema),
            ("tool", STRUCTURE_TOOL_NAME),
            ("target_kind", target_kind),
            ("valid_verdict", valid_verdict),
        ],
    )
}
