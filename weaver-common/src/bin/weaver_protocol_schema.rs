// ABOUTME: emits a json schema for the weaverd request and outcome envelopes to stdout.
// ABOUTME: intended for clients that want to validate their payloads before sending.

fn main() {
    let request = schemars::schema_for!(weaver_common::FacadeRequest);
    let outcome = schemars::schema_for!(weaver_common::ActionOutcome);
    let both = serde_json::json!({
        "request": request,
        "outcome": outcome,
    });
    let json = serde_json::to_string_pretty(&both).expect("serialize schema");
    println!("{json}");
}
