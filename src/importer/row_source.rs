// ==========================================
// 表格数据导入系统 - 表格行来源实现
// ==========================================
// 支持: CSV/TXT（分隔符与编码自动探测）, Excel (.xlsx/.xls)
// 约定: 打开即消费表头行；字段按表头宽度规整，宽度不一致永不报错
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::RowSource;
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::io::Cursor;
use std::path::Path;

/// 候选分隔符（探测顺序即并列时的优先级）
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

// ==========================================
// 按扩展名分派的统一入口
// ==========================================
pub fn open_row_source(path: &Path) -> ImportResult<Box<dyn RowSource>> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" | "txt" => Ok(Box::new(CsvRowSource::open(path)?)),
        "xlsx" | "xls" => Ok(Box::new(ExcelRowSource::open(path)?)),
        _ => Err(ImportError::UnsupportedFormat(ext)),
    }
}

// ==========================================
// CsvRowSource - 分隔符文件行来源
// ==========================================
// 流程: 去 BOM → 编码探测并转码为 UTF-8 → 分隔符探测 → 惰性行迭代
pub struct CsvRowSource {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<Cursor<Vec<u8>>>,
}

impl CsvRowSource {
    pub fn open(path: &Path) -> ImportResult<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Err(ImportError::EmptyFile(path.display().to_string()));
        }

        let body = strip_bom(&bytes);
        let encoding = detect_encoding(body);
        let (text, _, _) = encoding.decode(body);
        let delimiter = detect_delimiter(text.lines().next().unwrap_or_default());
        let data = text.into_owned().into_bytes();

        // 表头行手动读取，以区分“文件为空”和“无表头”
        let mut records = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(Cursor::new(data))
            .into_records();

        let header_record = match records.next() {
            Some(record) => record?,
            None => return Err(ImportError::HeaderMissing(path.display().to_string())),
        };

        let headers: Vec<String> = header_record.iter().map(|h| h.trim().to_string()).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::HeaderMissing(path.display().to_string()));
        }

        Ok(Self { headers, records })
    }
}

impl RowSource for CsvRowSource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn skip_rows(&mut self, n: usize) -> ImportResult<usize> {
        let mut skipped = 0;
        while skipped < n {
            match self.records.next() {
                Some(record) => {
                    record?;
                    skipped += 1;
                }
                None => break, // EOF: 完成信号
            }
        }
        Ok(skipped)
    }

    fn next_row(&mut self) -> ImportResult<Option<Vec<String>>> {
        match self.records.next() {
            Some(record) => {
                let fields: Vec<String> = record?.iter().map(|f| f.to_string()).collect();
                Ok(Some(normalize_width(fields, self.headers.len())))
            }
            None => Ok(None),
        }
    }
}

// ==========================================
// ExcelRowSource - 电子表格行来源
// ==========================================
// calamine 将工作表整体载入内存，这里仅维护行游标以满足惰性迭代契约
pub struct ExcelRowSource {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    cursor: usize,
}

impl ExcelRowSource {
    pub fn open(path: &Path) -> ImportResult<Self> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        let sheet_names = workbook.sheet_names();
        let sheet_name = sheet_names
            .first()
            .cloned()
            .ok_or_else(|| ImportError::EmptyFile(path.display().to_string()))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        let mut row_iter = range.rows();
        let header_row = row_iter
            .next()
            .ok_or_else(|| ImportError::HeaderMissing(path.display().to_string()))?;

        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::HeaderMissing(path.display().to_string()));
        }

        let width = headers.len();
        let rows: Vec<Vec<String>> = row_iter
            .map(|cells| {
                normalize_width(cells.iter().map(|c| c.to_string()).collect(), width)
            })
            .filter(|fields| fields.iter().any(|f| !f.is_empty()))
            .collect();

        Ok(Self {
            headers,
            rows,
            cursor: 0,
        })
    }
}

impl RowSource for ExcelRowSource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn skip_rows(&mut self, n: usize) -> ImportResult<usize> {
        let remaining = self.rows.len() - self.cursor;
        let skipped = n.min(remaining);
        self.cursor += skipped;
        Ok(skipped)
    }

    fn next_row(&mut self) -> ImportResult<Option<Vec<String>>> {
        match self.rows.get(self.cursor) {
            Some(row) => {
                self.cursor += 1;
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }
}

// ==========================================
// 探测辅助函数
// ==========================================

/// 去除 UTF-8 BOM
fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

/// 探测输入编码
///
/// 整段通过 UTF-8 校验即为 UTF-8（ASCII 是其子集），否则按
/// Windows-1252 处理（ISO-8859-1 字节在该码表下同样可解）
fn detect_encoding(body: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(body).is_ok() {
        UTF_8
    } else {
        WINDOWS_1252
    }
}

/// 在候选集合中选出首行产生字段数最多的分隔符
fn detect_delimiter(first_line: &str) -> u8 {
    let mut best = DELIMITER_CANDIDATES[0];
    let mut best_fields = 0;
    for candidate in DELIMITER_CANDIDATES {
        let fields = first_line.split(candidate as char).count();
        if fields > best_fields {
            best = candidate;
            best_fields = fields;
        }
    }
    best
}

/// 规整字段宽度: 截断多余字段，缺失尾部补空字符串
fn normalize_width(mut fields: Vec<String>, width: usize) -> Vec<String> {
    fields.truncate(width);
    while fields.len() < width {
        fields.push(String::new());
    }
    fields
}
