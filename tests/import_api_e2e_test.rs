// ==========================================
// 导入 API 端到端测试
// ==========================================
// 测试目标: 配置校验 → 预览 → 批次驱动循环 → 历史查询 → 模板管理
// ==========================================

mod test_helpers;

use tabular_import::api::{ApiError, ImportApi};
use tabular_import::domain::import::{ColumnMapping, ColumnRule};
use tabular_import::domain::types::{ImportMode, ValueSource};
use tabular_import::importer::BATCH_SIZE;
use tempfile::TempDir;
use test_helpers::*;

const OPERATOR: &str = "admin";

#[tokio::test]
async fn test_full_drive_loop_until_completed() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = ImportApi::new(db_path.clone());

    let upload_dir = TempDir::new().unwrap();
    let total_rows = 230;
    let file = write_upload_csv(&upload_dir, "contacts.csv", &contacts_csv(total_rows)).unwrap();

    let configured = api
        .configure_run(
            OPERATOR,
            file,
            "contacts",
            contacts_mapping(),
            options(ImportMode::Insert, &["id"]),
        )
        .await
        .unwrap();
    assert_eq!(configured.total_records, total_rows as u64);

    // 外部驱动方循环: 反复触发直到 completed
    let mut batch_index = 0u64;
    let mut cumulative_processed = 0u64;
    loop {
        let report = api.process_batch(OPERATOR, batch_index).await.unwrap();
        if report.completed {
            // 末批报告为全运行累计值
            assert_eq!(report.processed, total_rows as u64);
            assert_eq!(report.inserted, total_rows as u64);
            break;
        }
        cumulative_processed += report.processed;
        batch_index += 1;
        assert!(batch_index < 10, "驱动循环未收敛");
    }

    // 调用次数 = ceil(R/B)
    assert_eq!(batch_index as usize, total_rows / BATCH_SIZE);
    assert_eq!(cumulative_processed, (batch_index as u64) * BATCH_SIZE as u64);
    assert_eq!(count_rows(&db_path, "contacts"), total_rows as i64);

    // 历史可查
    let logs = api.recent_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_id, OPERATOR);
    assert_eq!(logs[0].total_rows, total_rows as u64);

    let user_logs = api.logs_for_user(OPERATOR, 10).await.unwrap();
    assert_eq!(user_logs.len(), 1);
}

#[tokio::test]
async fn test_preview_mapping_does_not_write() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = ImportApi::new(db_path.clone());

    let upload_dir = TempDir::new().unwrap();
    let file = write_upload_csv(&upload_dir, "contacts.csv", &contacts_csv(5)).unwrap();

    api.configure_run(
        OPERATOR,
        file,
        "contacts",
        contacts_mapping(),
        options(ImportMode::Insert, &["id"]),
    )
    .await
    .unwrap();

    let preview = api.preview_mapping(OPERATOR, 2).await.unwrap();

    assert_eq!(preview.headers, vec!["id", "name", "email"]);
    assert_eq!(preview.rows.len(), 2);
    // 转换在预览中已生效，id 被跳过
    assert!(!preview.rows[0].contains("id"));
    assert_eq!(
        preview.rows[0].get("email"),
        Some(&Some("user1@example.com".to_string()))
    );

    // 预览不落库
    assert_eq!(count_rows(&db_path, "contacts"), 0);
}

#[tokio::test]
async fn test_preview_without_run_is_not_found() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = ImportApi::new(db_path);

    let result = api.preview_mapping(OPERATOR, 5).await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn test_configure_rejects_missing_table() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = ImportApi::new(db_path);

    let upload_dir = TempDir::new().unwrap();
    let file = write_upload_csv(&upload_dir, "contacts.csv", &contacts_csv(1)).unwrap();

    let result = api
        .configure_run(
            OPERATOR,
            file,
            "no_such_table",
            contacts_mapping(),
            options(ImportMode::Insert, &["id"]),
        )
        .await;

    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn test_configure_rejects_uncovered_required_column() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = ImportApi::new(db_path);

    let upload_dir = TempDir::new().unwrap();
    let file = write_upload_csv(&upload_dir, "contacts.csv", &contacts_csv(1)).unwrap();

    // name 非空无默认值，映射未覆盖
    let mapping = ColumnMapping::new(vec![ColumnRule::from_column("email", "email")]);
    let result = api
        .configure_run(
            OPERATOR,
            file,
            "contacts",
            mapping,
            options(ImportMode::Insert, &[]),
        )
        .await;

    match result {
        Err(ApiError::InvalidInput(msg)) => assert!(msg.contains("name")),
        other => panic!("expected InvalidInput, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_configure_allows_keep_current_in_update_mode() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = ImportApi::new(db_path);

    let upload_dir = TempDir::new().unwrap();
    let file = write_upload_csv(&upload_dir, "contacts.csv", &contacts_csv(1)).unwrap();

    // update 模式不产生新行: name 仅 keep_current 也合法
    let mut name = ColumnRule::from_column("name", "name");
    name.source = ValueSource::KeepCurrent;
    let mapping = ColumnMapping::new(vec![ColumnRule::from_column("id", "id"), name]);

    let result = api
        .configure_run(
            OPERATOR,
            file,
            "contacts",
            mapping,
            options(ImportMode::Update, &["id"]),
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_configure_rejects_unknown_columns() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = ImportApi::new(db_path);

    let upload_dir = TempDir::new().unwrap();

    // 未知目标列
    let file = write_upload_csv(&upload_dir, "a.csv", &contacts_csv(1)).unwrap();
    let mut mapping = contacts_mapping();
    mapping.rules.push(ColumnRule::from_column("ghost", "name"));
    let result = api
        .configure_run(
            OPERATOR,
            file,
            "contacts",
            mapping,
            options(ImportMode::Insert, &["id"]),
        )
        .await;
    assert!(matches!(result, Err(ApiError::InvalidInput(_))));

    // 未知键列
    let file = write_upload_csv(&upload_dir, "b.csv", &contacts_csv(1)).unwrap();
    let result = api
        .configure_run(
            OPERATOR,
            file,
            "contacts",
            contacts_mapping(),
            options(ImportMode::Insert, &["ghost_key"]),
        )
        .await;
    assert!(matches!(result, Err(ApiError::InvalidInput(_))));

    // 重复目标列
    let file = write_upload_csv(&upload_dir, "c.csv", &contacts_csv(1)).unwrap();
    let mut mapping = contacts_mapping();
    mapping.rules.push(ColumnRule::from_column("email", "email"));
    let result = api
        .configure_run(
            OPERATOR,
            file,
            "contacts",
            mapping,
            options(ImportMode::Insert, &["id"]),
        )
        .await;
    assert!(matches!(result, Err(ApiError::InvalidInput(_))));
}

#[tokio::test]
async fn test_cancel_via_api_acknowledges() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = ImportApi::new(db_path);

    let upload_dir = TempDir::new().unwrap();
    let file = write_upload_csv(&upload_dir, "contacts.csv", &contacts_csv(3)).unwrap();

    api.configure_run(
        OPERATOR,
        file,
        "contacts",
        contacts_mapping(),
        options(ImportMode::Insert, &["id"]),
    )
    .await
    .unwrap();

    api.cancel_import(OPERATOR).await.expect("cancel active run");
    api.cancel_import(OPERATOR).await.expect("cancel idempotent");

    // 取消后批次触发: 资源未找到
    let result = api.process_batch(OPERATOR, 0).await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn test_mapping_template_lifecycle() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = ImportApi::new(db_path);

    let mapping = contacts_mapping();

    // 保存 → 读取
    let saved = api
        .save_mapping_template("contacts-default", "contacts", &mapping)
        .unwrap();
    assert_eq!(saved.name, "contacts-default");

    let loaded = api.load_mapping_template("contacts-default").unwrap();
    assert_eq!(loaded.table, "contacts");
    assert_eq!(loaded.mapping, mapping);

    // 列表（第二个模板）
    api.save_mapping_template("subscribers-default", "subscribers", &mapping)
        .unwrap();
    let templates = api.list_mapping_templates().unwrap();
    assert_eq!(templates.len(), 2);
    assert_eq!(templates[0].name, "contacts-default");

    // 同名覆盖
    let mut changed = contacts_mapping();
    changed.rules.pop();
    api.save_mapping_template("contacts-default", "contacts", &changed)
        .unwrap();
    let reloaded = api.load_mapping_template("contacts-default").unwrap();
    assert_eq!(reloaded.mapping, changed);
    assert_eq!(api.list_mapping_templates().unwrap().len(), 2);

    // 删除（幂等）
    api.delete_mapping_template("contacts-default").unwrap();
    api.delete_mapping_template("contacts-default").unwrap();
    assert!(matches!(
        api.load_mapping_template("contacts-default"),
        Err(ApiError::NotFound(_))
    ));
    assert_eq!(api.list_mapping_templates().unwrap().len(), 1);
}
