// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、上传文件生成、组件装配等功能
// ==========================================

use rusqlite::Connection;
use std::error::Error;
use std::io::Write;
use std::path::Path;
use tabular_import::config::ConfigManager;
use tabular_import::db;
use tabular_import::domain::import::{ColumnMapping, ColumnRule, ImportOptions, UploadedFile};
use tabular_import::domain::types::{ImportMode, Transform};
use tabular_import::importer::{BatchRunner, FieldMapperImpl};
use tabular_import::repository::{
    ImportLogRepositoryImpl, ProgressStoreImpl, TargetTableRepositoryImpl,
};
use tempfile::{NamedTempFile, TempDir};

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = Connection::open(&db_path)?;

    // 初始化 schema
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 初始化数据库 schema（基础设施表 + 测试目标表）
fn init_schema(conn: &Connection) -> Result<(), Box<dyn Error>> {
    db::init_core_schema(conn)?;

    // 测试目标表: contacts（name 非空无默认值，属必填列）
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            city TEXT,
            note TEXT
        )
        "#,
        [],
    )?;

    // 测试目标表: subscribers（自增主键 + 唯一约束，用于行级失败场景）
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS subscribers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            tier TEXT
        )
        "#,
        [],
    )?;

    Ok(())
}

/// 在指定目录下生成上传 CSV 文件并构造文件描述
pub fn write_upload_csv(
    dir: &TempDir,
    file_name: &str,
    content: &str,
) -> Result<UploadedFile, Box<dyn Error>> {
    let path = dir.path().join(file_name);
    let mut file = std::fs::File::create(&path)?;
    file.write_all(content.as_bytes())?;
    file.flush()?;

    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    Ok(UploadedFile {
        name: file_name.to_string(),
        path: path.to_str().unwrap().to_string(),
        extension,
        size: content.len() as u64,
    })
}

/// 生成 N 行数据的 contacts CSV 内容（id,name,email 表头）
pub fn contacts_csv(rows: usize) -> String {
    let mut content = String::from("id,name,email\n");
    for i in 1..=rows {
        content.push_str(&format!("C{:04},User {},user{}@Example.COM\n", i, i, i));
    }
    content
}

/// 创建测试用的 BatchRunner
pub fn create_test_runner(
    db_path: &str,
) -> BatchRunner<TargetTableRepositoryImpl, ProgressStoreImpl, ConfigManager> {
    let table_repo = TargetTableRepositoryImpl::new(db_path).expect("Failed to create repo");
    let progress = ProgressStoreImpl::new(db_path).expect("Failed to create progress store");
    let config = ConfigManager::new(db_path).expect("Failed to create config");
    let field_mapper = Box::new(FieldMapperImpl);
    let log_repo =
        Box::new(ImportLogRepositoryImpl::new(db_path).expect("Failed to create log repo"));

    BatchRunner::new(table_repo, progress, config, field_mapper, log_repo)
}

/// 标准 contacts 映射: id 跳过，name 直通，email 转小写
pub fn contacts_mapping() -> ColumnMapping {
    let mut email = ColumnRule::from_column("email", "email");
    email.transform = Transform::Lowercase;

    ColumnMapping::new(vec![
        ColumnRule::skipped("id"),
        ColumnRule::from_column("name", "name"),
        email,
    ])
}

/// 带键列的 contacts 映射: id 作为键参与写入
pub fn contacts_mapping_with_id() -> ColumnMapping {
    let mut email = ColumnRule::from_column("email", "email");
    email.transform = Transform::Lowercase;

    ColumnMapping::new(vec![
        ColumnRule::from_column("id", "id"),
        ColumnRule::from_column("name", "name"),
        email,
    ])
}

/// 标准导入选项
pub fn options(mode: ImportMode, key_columns: &[&str]) -> ImportOptions {
    ImportOptions {
        mode,
        key_columns: key_columns.iter().map(|k| k.to_string()).collect(),
        allow_null: false,
    }
}

/// 查询目标表行数
pub fn count_rows(db_path: &str, table: &str) -> i64 {
    let conn = Connection::open(db_path).expect("Failed to open db");
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .expect("Failed to count rows")
}

/// 查询 contacts 表指定 name 的 email
pub fn email_of(db_path: &str, name: &str) -> Option<String> {
    let conn = Connection::open(db_path).expect("Failed to open db");
    conn.query_row(
        "SELECT email FROM contacts WHERE name = ?1",
        [name],
        |row| row.get(0),
    )
    .ok()
}
