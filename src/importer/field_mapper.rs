// ==========================================
// 表格数据导入系统 - 字段映射器实现
// ==========================================
// 职责: 按列映射规则将原始行转换为目标记录
// 求值顺序: skip → keep_current → 取值/默认值 → 转换 → NULL 策略
// 红线: 转换集合封闭可枚举，永不执行用户提供的表达式
// ==========================================

use crate::domain::import::{ColumnMapping, MappedRow};
use crate::domain::types::{Transform, ValueSource};
use crate::importer::importer_trait::FieldMapper as FieldMapperTrait;
use std::collections::HashMap;

pub struct FieldMapperImpl;

impl FieldMapperTrait for FieldMapperImpl {
    fn map_row(
        &self,
        row: &HashMap<String, String>,
        mapping: &ColumnMapping,
        allow_null: bool,
    ) -> MappedRow {
        let mut mapped = MappedRow::default();

        for rule in &mapping.rules {
            // skip 规则永不求值
            if rule.skip {
                continue;
            }

            // keep_current: 由数据库操作保留既有值，输出中不出现该列
            let source_field = match &rule.source {
                ValueSource::KeepCurrent => continue,
                ValueSource::Column(name) if !name.trim().is_empty() => Some(name.as_str()),
                _ => None,
            };

            // 取值: 源字段存在取其值，否则落入默认值
            let resolved = source_field
                .and_then(|name| row.get(name))
                .cloned()
                .unwrap_or_else(|| rule.default_value.clone());

            let transformed = apply_transform(&resolved, rule.transform);

            // NULL 策略: 列级与全局许可同时成立才产出 SQL NULL
            let value = if transformed.is_empty() && rule.allow_null && allow_null {
                None
            } else {
                Some(transformed)
            };

            mapped.push(&rule.target, value);
        }

        mapped
    }
}

/// 应用封闭转换集合中的一项
///
/// 纯函数、locale 无关、仅 ASCII 大小写折叠。未指定转换时对
/// 反斜杠日期串做标准化
fn apply_transform(value: &str, transform: Transform) -> String {
    match transform {
        Transform::None => reformat_backslash_date(value).unwrap_or_else(|| value.to_string()),
        Transform::Trim => value.trim().to_string(),
        Transform::Uppercase => value.to_ascii_uppercase(),
        Transform::Lowercase => value.to_ascii_lowercase(),
        Transform::Capitalize => capitalize_words(value),
    }
}

/// 单词首字母大写（ASCII）
fn capitalize_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for ch in value.chars() {
        if ch.is_whitespace() {
            at_word_start = true;
            out.push(ch);
        } else if at_word_start {
            out.push(ch.to_ascii_uppercase());
            at_word_start = false;
        } else {
            out.push(ch.to_ascii_lowercase());
        }
    }
    out
}

/// 识别 `YYYY\MM\DD` 形式的日期串并标准化为 `YYYY-MM-DD`
///
/// # 返回
/// - Some(String): 识别且日历合法，返回标准形式
/// - None: 不是反斜杠日期串（原样保留由调用方负责）
fn reformat_backslash_date(value: &str) -> Option<String> {
    let parts: Vec<&str> = value.split('\\').collect();
    if parts.len() != 3 {
        return None;
    }
    if parts[0].len() != 4 || parts[1].is_empty() || parts[1].len() > 2 {
        return None;
    }
    if parts[2].is_empty() || parts[2].len() > 2 {
        return None;
    }
    if !parts.iter().all(|p| p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let day: u32 = parts[2].parse().ok()?;

    // 日历合法性校验（2\30 之类原样保留）
    chrono::NaiveDate::from_ymd_opt(year, month, day)?;

    Some(format!("{:04}-{:02}-{:02}", year, month, day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::ColumnRule;

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn rule(target: &str, source: &str) -> ColumnRule {
        ColumnRule::from_column(target, source)
    }

    #[test]
    fn test_skip_rule_never_contributes() {
        let mapping = ColumnMapping::new(vec![
            ColumnRule::skipped("id"),
            rule("name", "name"),
        ]);
        let mapped = FieldMapperImpl.map_row(&row(&[("name", "Alice"), ("id", "7")]), &mapping, false);

        assert!(!mapped.contains("id"));
        assert_eq!(mapped.get("name"), Some(&Some("Alice".to_string())));
    }

    #[test]
    fn test_keep_current_omits_column() {
        let mut keep = rule("email", "email");
        keep.source = ValueSource::KeepCurrent;
        let mapping = ColumnMapping::new(vec![keep, rule("name", "name")]);

        let mapped = FieldMapperImpl.map_row(&row(&[("name", "A"), ("email", "x@y.z")]), &mapping, false);

        assert!(!mapped.contains("email"));
        assert!(mapped.contains("name"));
    }

    #[test]
    fn test_missing_source_field_falls_back_to_default() {
        let mut r = rule("city", "city");
        r.default_value = "Beijing".to_string();
        let mapping = ColumnMapping::new(vec![r]);

        let mapped = FieldMapperImpl.map_row(&row(&[("name", "A")]), &mapping, false);

        assert_eq!(mapped.get("city"), Some(&Some("Beijing".to_string())));
    }

    #[test]
    fn test_missing_source_field_without_default_is_empty_string() {
        let mapping = ColumnMapping::new(vec![rule("city", "no_such_header")]);
        let mapped = FieldMapperImpl.map_row(&row(&[("name", "A")]), &mapping, false);

        // 不是错误: 产出空字符串
        assert_eq!(mapped.get("city"), Some(&Some(String::new())));
    }

    #[test]
    fn test_transforms() {
        for (transform, input, expected) in [
            (Transform::Trim, "  a b  ", "a b"),
            (Transform::Uppercase, "aBc", "ABC"),
            (Transform::Lowercase, "AbC", "abc"),
            (Transform::Capitalize, "john von neumann", "John Von Neumann"),
        ] {
            let mut r = rule("v", "v");
            r.transform = transform;
            let mapping = ColumnMapping::new(vec![r]);
            let mapped = FieldMapperImpl.map_row(&row(&[("v", input)]), &mapping, false);
            assert_eq!(
                mapped.get("v"),
                Some(&Some(expected.to_string())),
                "transform {transform} failed"
            );
        }
    }

    #[test]
    fn test_null_policy_requires_both_flags() {
        let mut r = rule("note", "note");
        r.allow_null = true;
        let mapping = ColumnMapping::new(vec![r]);
        let empty_row = row(&[("note", "")]);

        // 全局开关关闭: 空字符串
        let mapped = FieldMapperImpl.map_row(&empty_row, &mapping, false);
        assert_eq!(mapped.get("note"), Some(&Some(String::new())));

        // 双重许可: SQL NULL
        let mapped = FieldMapperImpl.map_row(&empty_row, &mapping, true);
        assert_eq!(mapped.get("note"), Some(&None));

        // 列级开关关闭: 空字符串
        let mut strict = rule("note", "note");
        strict.allow_null = false;
        let mapping = ColumnMapping::new(vec![strict]);
        let mapped = FieldMapperImpl.map_row(&empty_row, &mapping, true);
        assert_eq!(mapped.get("note"), Some(&Some(String::new())));
    }

    #[test]
    fn test_backslash_date_reformatted_without_transform() {
        let mapping = ColumnMapping::new(vec![rule("d", "d")]);
        let mapped = FieldMapperImpl.map_row(&row(&[("d", r"2025\1\20")]), &mapping, false);
        assert_eq!(mapped.get("d"), Some(&Some("2025-01-20".to_string())));

        // 非法日历值原样保留
        let mapped = FieldMapperImpl.map_row(&row(&[("d", r"2025\2\30")]), &mapping, false);
        assert_eq!(mapped.get("d"), Some(&Some(r"2025\2\30".to_string())));

        // 指定转换时不做日期标准化
        let mut r = rule("d", "d");
        r.transform = Transform::Trim;
        let mapping = ColumnMapping::new(vec![r]);
        let mapped = FieldMapperImpl.map_row(&row(&[("d", r"2025\1\20")]), &mapping, false);
        assert_eq!(mapped.get("d"), Some(&Some(r"2025\1\20".to_string())));
    }

    #[test]
    fn test_output_preserves_rule_order() {
        let mapping = ColumnMapping::new(vec![rule("b", "b"), rule("a", "a")]);
        let mapped = FieldMapperImpl.map_row(&row(&[("a", "1"), ("b", "2")]), &mapping, false);

        let names: Vec<&str> = mapped.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
