use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::structs::quiz_type::ChoiceId;

/// 一道题的作答，解析失败的字段一律视为未作答
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerRecord {
    pub text_response: Option<String>,
    pub numeric_response: Option<f64>,
    pub selected_choice_ids: Vec<ChoiceId>,
}

/// AttemptQuestion ID（十进制字符串）到作答的映射
pub type AnswerMap = HashMap<String, AnswerRecord>;

/// 提交请求中可能携带答案的三个位置
#[derive(Debug, Default)]
pub struct RawSubmission {
    /// 已解码的json请求体
    pub body: Option<Value>,
    /// 名为answers的文本字段
    pub answers_field: Option<String>,
    /// 名为answers的上传文件内容
    pub answers_file: Option<Vec<u8>>,
}

impl RawSubmission {
    /// 依次尝试请求体、文本字段、上传文件，第一个成功的结果生效；都失败时返回空映射
    pub fn into_answers(self) -> AnswerMap {
        let RawSubmission {
            body,
            answers_field,
            answers_file,
        } = self;

        if let Some(Value::Object(map)) = &body {
            if !map.is_empty() {
                match map.get("answers") {
                    Some(Value::Object(inner)) => return coerce_map(unwrap_answers(inner.clone())),
                    None => return coerce_map(unwrap_answers(map.clone())),
                    Some(_) => {}
                }
            }
        }

        // json请求体里answers为字符串时，和表单字段同样处理
        let field = answers_field.or_else(|| match &body {
            Some(Value::Object(map)) => map.get("answers").and_then(Value::as_str).map(str::to_string),
            _ => None,
        });
        if let Some(text) = field {
            match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => return coerce_map(unwrap_answers(map)),
                Ok(_) => log::debug!("answers字段不是json对象，忽略"),
                Err(e) => log::debug!("answers字段不是合法json: {}", e),
            }
        }

        if let Some(bytes) = answers_file {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => return coerce_map(unwrap_answers(map)),
                Ok(_) => log::debug!("answers文件不是json对象，忽略"),
                Err(e) => log::debug!("answers文件不是合法json: {}", e),
            }
        }

        log::warn!("提交中没有可用的答案，按全部未作答处理");
        AnswerMap::new()
    }
}

/// 客户端常把答案再包一层{"answers": {...}}
fn unwrap_answers(mut map: Map<String, Value>) -> Map<String, Value> {
    match map.remove("answers") {
        Some(Value::Object(inner)) => inner,
        Some(other) => {
            map.insert("answers".to_string(), other);
            map
        }
        None => map,
    }
}

fn coerce_map(map: Map<String, Value>) -> AnswerMap {
    map.iter()
        .map(|(key, value)| (key.trim().to_string(), coerce_record(value)))
        .collect()
}

/// 把单题的json作答转为AnswerRecord
pub fn coerce_record(value: &Value) -> AnswerRecord {
    let Value::Object(fields) = value else {
        return AnswerRecord::default();
    };
    AnswerRecord {
        text_response: fields.get("text_response").and_then(coerce_text),
        numeric_response: fields.get("numeric_response").and_then(coerce_numeric),
        selected_choice_ids: fields
            .get("selected_choice_ids")
            .map(coerce_choice_ids)
            .unwrap_or_default(),
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 字符串、整数、浮点数都转为f64，空字符串视为无值；布尔值按1和0处理
fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()
        }
        _ => None,
    }
}

/// 任意一个元素无法转为整数时，整个列表作废
fn coerce_choice_ids(value: &Value) -> Vec<ChoiceId> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .map(coerce_choice_id)
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

fn coerce_choice_id(value: &Value) -> Option<ChoiceId> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn from_body(body: Value) -> AnswerMap {
        RawSubmission {
            body: Some(body),
            ..Default::default()
        }
        .into_answers()
    }

    #[test]
    fn json_body_with_answers_wrapper() {
        let answers = from_body(json!({
            "answers": {"12": {"text_response": "Paris", "selected_choice_ids": [3, "4"]}}
        }));
        assert_eq!(
            answers["12"],
            AnswerRecord {
                text_response: Some("Paris".to_string()),
                numeric_response: None,
                selected_choice_ids: vec![3, 4],
            }
        );
    }

    #[test]
    fn json_body_without_wrapper() {
        let answers = from_body(json!({"7": {"numeric_response": "4.5"}}));
        assert_eq!(answers["7"].numeric_response, Some(4.5));
    }

    #[test]
    fn answers_string_in_json_body_is_decoded() {
        let answers = from_body(json!({"answers": "{\"5\": {\"numeric_response\": 2}}"}));
        assert_eq!(answers["5"].numeric_response, Some(2.0));
    }

    #[test]
    fn form_field_then_file_part() {
        let answers = RawSubmission {
            body: None,
            answers_field: Some("not json".to_string()),
            answers_file: Some(br#"{"answers": {"9": {"text_response": "Earth"}}}"#.to_vec()),
        }
        .into_answers();
        assert_eq!(answers["9"].text_response.as_deref(), Some("Earth"));
    }

    #[test]
    fn form_field_wins_over_file_part() {
        let answers = RawSubmission {
            body: None,
            answers_field: Some(r#"{"1": {"text_response": "field"}}"#.to_string()),
            answers_file: Some(br#"{"1": {"text_response": "file"}}"#.to_vec()),
        }
        .into_answers();
        assert_eq!(answers["1"].text_response.as_deref(), Some("field"));
    }

    #[test]
    fn nothing_usable_gives_empty_map() {
        let answers = RawSubmission {
            body: Some(json!({})),
            answers_field: Some(String::new()),
            answers_file: Some(b"\xff\xfe".to_vec()),
        }
        .into_answers();
        assert!(answers.is_empty());
        assert!(RawSubmission::default().into_answers().is_empty());
        assert!(from_body(json!([1, 2, 3])).is_empty());
    }

    #[test]
    fn numeric_coercion() {
        let record = |v: Value| coerce_record(&json!({ "numeric_response": v })).numeric_response;
        assert_eq!(record(json!("  3.25 ")), Some(3.25));
        assert_eq!(record(json!("")), None);
        assert_eq!(record(json!("abc")), None);
        assert_eq!(record(json!(0)), Some(0.0));
        assert_eq!(record(json!(7)), Some(7.0));
        assert_eq!(record(json!(null)), None);
        assert_eq!(record(json!(true)), Some(1.0));
        assert_eq!(record(json!(false)), Some(0.0));
    }

    #[test]
    fn bad_choice_id_discards_whole_list() {
        let record = |v: Value| coerce_record(&json!({ "selected_choice_ids": v })).selected_choice_ids;
        assert_eq!(record(json!([1, " 2 ", 3.0])), vec![1, 2, 3]);
        assert_eq!(record(json!([1, "two", 3])), Vec::<ChoiceId>::new());
        assert_eq!(record(json!([1, null])), Vec::<ChoiceId>::new());
        assert_eq!(record(json!("12")), Vec::<ChoiceId>::new());
        assert_eq!(record(json!([true, false, 2])), vec![1, 0, 2]);
    }

    #[test]
    fn each_stage_removes_one_inner_wrapper() {
        // 请求体先取answers成员，再去掉一层内部包装
        let answers = from_body(json!({"answers": {"answers": {"4": {"text_response": "x"}}}}));
        assert_eq!(answers["4"].text_response.as_deref(), Some("x"));

        // 文件内容本身只去掉一层，更深的包装保留为普通键
        let answers = RawSubmission {
            answers_file: Some(br#"{"answers": {"answers": {"4": {"text_response": "x"}}}}"#.to_vec()),
            ..Default::default()
        }
        .into_answers();
        assert!(!answers.contains_key("4"));
        assert_eq!(answers["answers"], AnswerRecord::default());
    }

    #[test]
    fn non_object_entry_is_unanswered() {
        let answers = from_body(json!({"3": "Paris"}));
        assert_eq!(answers["3"], AnswerRecord::default());
    }
}
