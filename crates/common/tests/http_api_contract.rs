use std::collections::BTreeSet;

use gitseal_common::protocol::api::{ErrorCode, ALL_ERROR_CODES};
use gitseal_common::protocol::routes::ALL_ROUTES;

fn load_contract() -> serde_json::Value {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts/http-api.json");
    let content = std::fs::read_to_string(path).expect("contract file should be readable");
    serde_json::from_str(&content).expect("contract file should be valid JSON")
}

#[test]
fn routes_match_contract() {
    let contract = load_contract();
    let expected: BTreeSet<&str> = contract["routes"]
        .as_array()
        .expect("routes should be an array")
        .iter()
        .map(|route| route["path"].as_str().expect("path should be a string"))
        .collect();

    let actual: BTreeSet<&str> = ALL_ROUTES.iter().copied().collect();
    assert_eq!(actual, expected, "ALL_ROUTES diverged from contract");
}

#[test]
fn error_codes_match_contract() {
    let contract = load_contract();
    let codes = contract["error_codes"].as_object().expect("error_codes should be an object");

    let expected: BTreeSet<&str> = codes.keys().map(String::as_str).collect();
    let actual: BTreeSet<&str> = ALL_ERROR_CODES.iter().map(|code| code.as_str()).collect();
    assert_eq!(actual, expected, "ALL_ERROR_CODES diverged from contract");

    for (name, entry) in codes {
        let code = ErrorCode::parse(name).expect("contract code should parse");
        assert_eq!(
            u64::from(code.http_status()),
            entry["status"].as_u64().expect("status should be a number"),
            "{name} status diverged from contract"
        );
        assert_eq!(
            code.retryable(),
            entry["retryable"].as_bool().expect("retryable should be a bool"),
            "{name} retryable flag diverged from contract"
        );
    }
}
