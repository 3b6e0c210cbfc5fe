//! Intrinsic function helpers.
//!
//! Each helper returns the JSON shape the template engine expects, so
//! constructs can compose them like ordinary values.

use serde_json::{json, Value};

use super::LogicalId;

/// `AWS::Partition` pseudo parameter
pub const PARTITION: &str = "AWS::Partition";

/// `AWS::AccountId` pseudo parameter
pub const ACCOUNT_ID: &str = "AWS::AccountId";

/// `{"Ref": <logical id>}`
pub fn reference(id: &LogicalId) -> Value {
    json!({ "Ref": id.as_str() })
}

/// `{"Ref": <pseudo parameter>}`
pub fn pseudo(name: &str) -> Value {
    json!({ "Ref": name })
}

/// `{"Fn::GetAtt": [<logical id>, <attribute>]}`
pub fn get_att(id: &LogicalId, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id.as_str(), attribute] })
}

/// `{"Fn::Join": [<separator>, [<parts>...]]}`
pub fn join(separator: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [separator, parts] })
}

/// `{"Fn::Sub": <template string>}`
pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

/// `{"Fn::Select": [<index>, <list>]}`
pub fn select(index: u32, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// `{"Fn::Split": [<separator>, <source>]}`
pub fn split(separator: &str, source: Value) -> Value {
    json!({ "Fn::Split": [separator, source] })
}

/// Logical id targeted by a `Ref`, if the value is one
pub fn ref_target(value: &Value) -> Option<&str> {
    value.get("Ref").and_then(Value::as_str)
}

/// Logical id targeted by a `Fn::GetAtt`, if the value is one
pub fn get_att_target(value: &Value) -> Option<&str> {
    value
        .get("Fn::GetAtt")
        .and_then(|args| args.get(0))
        .and_then(Value::as_str)
}

/// Every logical id a value references, directly or nested.
pub fn referenced_ids(value: &Value) -> Vec<String> {
    let mut ids = Vec::new();
    collect_ids(value, &mut ids);
    ids.sort();
    ids.dedup();
    ids
}

fn collect_ids(value: &Value, ids: &mut Vec<String>) {
    if let Some(id) = ref_target(value) {
        // Pseudo parameters are not resources
        if !id.starts_with("AWS::") {
            ids.push(id.to_string());
        }
        return;
    }
    if let Some(id) = get_att_target(value) {
        ids.push(id.to_string());
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_ids(v, ids)),
        Value::Object(map) => map.values().for_each(|v| collect_ids(v, ids)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_shapes() {
        let id = LogicalId::from_path(&["SiteBucket"]);
        assert_eq!(reference(&id), json!({ "Ref": id.as_str() }));
        assert_eq!(
            get_att(&id, "WebsiteURL"),
            json!({ "Fn::GetAtt": [id.as_str(), "WebsiteURL"] })
        );
        assert_eq!(ref_target(&reference(&id)), Some(id.as_str()));
        assert_eq!(get_att_target(&get_att(&id, "Arn")), Some(id.as_str()));
    }

    #[test]
    fn test_referenced_ids_skips_pseudo_parameters() {
        let bucket = LogicalId::from_path(&["SiteBucket"]);
        let dist = LogicalId::from_path(&["SiteDistribution"]);
        let value = join(
            "",
            vec![
                json!("arn:"),
                pseudo(PARTITION),
                json!(":cloudfront::"),
                reference(&dist),
                get_att(&bucket, "Arn"),
                reference(&dist),
            ],
        );

        let ids = referenced_ids(&value);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&bucket.as_str().to_string()));
        assert!(ids.contains(&dist.as_str().to_string()));
    }
}
