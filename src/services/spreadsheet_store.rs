//! Excel 存储服务 - 业务能力层
//!
//! 只负责两表结构（PAN_Data / GSTIN_Data）的读写与校验，不关心浏览器和流程
//!
//! ## 技术栈
//! - 使用 `calamine` 读取 .xlsx / .xls
//! - 使用 `rust_xlsxwriter` 整体重写工作簿（写回、备份、迁移共用一条路径）

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use rust_xlsxwriter::Workbook;
use tracing::{info, warn};

use crate::error::{AppError, StorageError, ValidationError};
use crate::models::gstin::{GstinDetails, GstinRow, LookupResult};
use crate::models::pan::{is_valid_pan, PanRow, PanStatus};
use crate::utils::time;

/// PAN 表名
pub const PAN_SHEET: &str = "PAN_Data";
/// GSTIN 表名
pub const GSTIN_SHEET: &str = "GSTIN_Data";

/// PAN 表列头（写回时固定此顺序）
const PAN_COLUMNS: [&str; 8] = [
    "PAN",
    "Name",
    "Email",
    "Phone",
    "Address",
    "GSTIN_Count",
    "Last_Updated",
    "Status",
];

/// GSTIN 表列头
const GSTIN_COLUMNS: [&str; 8] = [
    "PAN_Reference",
    "GSTIN",
    "GSTIN_Status",
    "State",
    "Trade_Name",
    "Registration_Date",
    "HSN_Codes",
    "Last_Updated",
];

/// 旧版单表里 PAN 列的常见叫法
const LEGACY_PAN_ALIASES: [&str; 4] = ["PAN_NUMBER", "PANNUMBER", "PAN_NO", "PANNO"];
/// 旧版单表里 GSTIN 列的常见叫法
const LEGACY_GSTIN_ALIASES: [&str; 5] = ["GST", "GST_NUMBER", "GSTNUMBER", "GST_NO", "GSTNO"];

/// Excel 存储服务
///
/// 职责：
/// - 校验输入文件并在需要时把旧版单表迁移成两表结构
/// - 从 PAN 表提取去重后的待处理 PAN 列表
/// - 把查询结果合并回两张表（先备份再落盘）
/// - 把 GSTIN 详情补充到 GSTIN 表
/// - 不操作浏览器
/// - 不决定处理顺序
pub struct SpreadsheetStore {
    path: PathBuf,
}

impl SpreadsheetStore {
    /// 创建指向某个工作簿的存储服务
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 工作簿路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========== 校验与加载 ==========

    /// 校验文件并加载两张表
    ///
    /// 检查顺序：文件存在 -> 可读 -> 扩展名 -> 可解析。
    /// 缺少 PAN_Data / GSTIN_Data 任意一张表时按旧版单表处理，迁移后写回。
    ///
    /// # 返回
    /// (PAN 表行, GSTIN 表行)
    pub fn validate_and_load(&self) -> Result<(Vec<PanRow>, Vec<GstinRow>), AppError> {
        let path_str = self.path.display().to_string();

        if !self.path.exists() {
            return Err(ValidationError::FileNotFound { path: path_str }.into());
        }

        // 只探测可读性，内容交给 calamine
        if let Err(e) = fs::File::open(&self.path) {
            return Err(ValidationError::FileUnreadable {
                path: path_str,
                message: e.to_string(),
            }
            .into());
        }

        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        if !matches!(extension.as_deref(), Some("xlsx") | Some("xls")) {
            return Err(ValidationError::UnsupportedExtension { path: path_str }.into());
        }

        let mut workbook = open_workbook_auto(&self.path).map_err(|e| {
            AppError::from(ValidationError::FileUnreadable {
                path: path_str.clone(),
                message: e.to_string(),
            })
        })?;

        let sheet_names = workbook.sheet_names().to_vec();
        let is_legacy = !sheet_names.iter().any(|s| s == PAN_SHEET)
            || !sheet_names.iter().any(|s| s == GSTIN_SHEET);

        let (pan_rows, gstin_rows) = if is_legacy {
            info!("🔄 检测到旧版单表格式，转换为两表结构");
            let (pan_rows, gstin_rows) = self.migrate_legacy(&mut workbook, &sheet_names)?;
            info!(
                "✓ 迁移完成: {} 个唯一 PAN, {} 条 GSTIN",
                pan_rows.len(),
                gstin_rows.len()
            );

            // 迁移结果立即写回，之后的运行直接走两表路径
            self.write_sheets_to(&self.path, &pan_rows, &gstin_rows)?;
            info!("✓ 已保存两表结构: {}", self.path.display());
            (pan_rows, gstin_rows)
        } else {
            let pan_range = workbook
                .worksheet_range(PAN_SHEET)
                .map_err(|e| AppError::from(StorageError::excel_read(&path_str, e)))?;
            let pan_rows = parse_pan_sheet(&pan_range);
            info!("✓ 读取 PAN 表: {} 行", pan_rows.len());

            let gstin_range = workbook
                .worksheet_range(GSTIN_SHEET)
                .map_err(|e| AppError::from(StorageError::excel_read(&path_str, e)))?;
            let gstin_rows = parse_gstin_sheet(&gstin_range);
            info!("✓ 读取 GSTIN 表: {} 行", gstin_rows.len());

            // PAN 列在解析时按表头定位，这里确认它确实存在
            let header_row = pan_range.rows().next();
            let has_pan_header = header_row
                .map(|row| {
                    row.iter()
                        .any(|cell| cell_to_string(cell).eq_ignore_ascii_case("PAN"))
                })
                .unwrap_or(false);
            if !has_pan_header {
                return Err(ValidationError::PanColumnMissing {
                    sheet: PAN_SHEET.to_string(),
                }
                .into());
            }

            (pan_rows, gstin_rows)
        };

        if pan_rows.iter().all(|row| row.pan.trim().is_empty()) {
            return Err(ValidationError::PanColumnEmpty {
                sheet: PAN_SHEET.to_string(),
            }
            .into());
        }

        // 无效 PAN 只告警不拦截，处理时会被提取步骤过滤掉
        let mut invalid_count = 0;
        for (i, row) in pan_rows.iter().enumerate() {
            let pan = row.pan.trim().to_uppercase();
            if !pan.is_empty() && !is_valid_pan(&pan) {
                invalid_count += 1;
                if invalid_count <= 5 {
                    warn!("⚠️ 第 {} 行 PAN 格式无效: {}", i + 2, pan);
                }
            }
        }
        if invalid_count > 0 {
            warn!("⚠️ PAN 表中共有 {} 个无效 PAN", invalid_count);
        }

        Ok((pan_rows, gstin_rows))
    }

    /// 旧版单表迁移
    ///
    /// 第一张表视为数据源：按列名启发式找到 PAN / GSTIN 列，
    /// PAN 去重后进 PAN 表（顺带保留联系人列），{PAN, GSTIN} 成对的行进 GSTIN 表。
    fn migrate_legacy(
        &self,
        workbook: &mut calamine::Sheets<std::io::BufReader<fs::File>>,
        sheet_names: &[String],
    ) -> Result<(Vec<PanRow>, Vec<GstinRow>), AppError> {
        let path_str = self.path.display().to_string();
        let first_sheet = sheet_names.first().ok_or_else(|| {
            AppError::from(StorageError::excel_read(&path_str, "工作簿中没有任何表"))
        })?;

        let range = workbook
            .worksheet_range(first_sheet)
            .map_err(|e| AppError::from(StorageError::excel_read(&path_str, e)))?;
        info!("✓ 读取旧版数据: {} 行", range.rows().count().saturating_sub(1));

        let headers: Vec<String> = range
            .rows()
            .next()
            .map(|row| row.iter().map(cell_to_string).collect())
            .unwrap_or_default();

        let pan_col = find_legacy_column(&headers, "PAN", &LEGACY_PAN_ALIASES).ok_or_else(|| {
            AppError::from(ValidationError::PanColumnMissing {
                sheet: first_sheet.clone(),
            })
        })?;
        info!("✓ 旧版 PAN 列: '{}'", headers[pan_col]);

        let gstin_col = find_legacy_column(&headers, "GSTIN", &LEGACY_GSTIN_ALIASES);
        if let Some(col) = gstin_col {
            info!("✓ 旧版 GSTIN 列: '{}'", headers[col]);
        }

        let contact_col = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
        };
        let name_col = contact_col("Name");
        let email_col = contact_col("Email");
        let phone_col = contact_col("Phone");
        let address_col = contact_col("Address");
        // 旧版状态列带空格，迁移后列名换成下划线风格
        let status_col = headers.iter().position(|h| h == "GSTIN Status");
        let state_col = headers.iter().position(|h| h == "State");

        let cell_at = |row: &[Data], col: Option<usize>| {
            col.and_then(|c| row.get(c)).map(cell_to_string).unwrap_or_default()
        };

        let mut pan_rows: Vec<PanRow> = Vec::new();
        let mut seen_pans: HashSet<String> = HashSet::new();
        let mut gstin_rows: Vec<GstinRow> = Vec::new();
        let now = time::now_iso();

        for row in range.rows().skip(1) {
            let pan = cell_at(row, Some(pan_col)).trim().to_uppercase();

            if is_valid_pan(&pan) && seen_pans.insert(pan.clone()) {
                pan_rows.push(PanRow {
                    pan: pan.clone(),
                    name: cell_at(row, name_col),
                    email: cell_at(row, email_col),
                    phone: cell_at(row, phone_col),
                    address: cell_at(row, address_col),
                    ..Default::default()
                });
            }

            if let Some(col) = gstin_col {
                let gstin = cell_at(row, Some(col)).trim().to_uppercase();
                if pan.len() == 10 && gstin.len() == 15 {
                    gstin_rows.push(GstinRow {
                        pan_reference: pan.clone(),
                        gstin,
                        gstin_status: cell_at(row, status_col),
                        state: cell_at(row, state_col),
                        last_updated: now.clone(),
                        ..Default::default()
                    });
                }
            }
        }

        Ok((pan_rows, gstin_rows))
    }

    // ========== 提取 ==========

    /// 从 PAN 表提取待处理的 PAN 列表
    ///
    /// 归一（trim + 大写）后按格式过滤、按首次出现顺序去重。
    ///
    /// # 返回
    /// (PAN 列表, PAN -> 行下标映射)
    pub fn extract_pan_numbers(rows: &[PanRow]) -> (Vec<String>, HashMap<String, usize>) {
        let mut pan_numbers = Vec::new();
        let mut pan_to_index = HashMap::new();

        for (i, row) in rows.iter().enumerate() {
            let pan = row.pan.trim().to_uppercase();
            if is_valid_pan(&pan) && !pan_to_index.contains_key(&pan) {
                pan_numbers.push(pan.clone());
                pan_to_index.insert(pan, i);
            }
        }

        info!("✓ 提取到 {} 个唯一有效 PAN", pan_numbers.len());
        (pan_numbers, pan_to_index)
    }

    // ========== 结果回写 ==========

    /// 把查询结果合并回两张表并落盘
    ///
    /// 落盘前先把当前（未合并）状态写成带时间戳的备份文件，
    /// 单次落盘失败时可以从备份恢复。
    ///
    /// # 参数
    /// - `pan_rows` / `gstin_rows`: 启动时加载的两张表（原地更新）
    /// - `results`: PAN -> 查询结果
    pub fn reconcile(
        &self,
        pan_rows: &mut Vec<PanRow>,
        gstin_rows: &mut Vec<GstinRow>,
        results: &BTreeMap<String, Vec<LookupResult>>,
    ) -> Result<(), AppError> {
        let backup_path = self.backup_path();
        self.write_sheets_to(&backup_path, pan_rows, gstin_rows)?;
        info!("✓ 已创建备份: {}", backup_path.display());

        let now = time::now_iso();

        // 更新 PAN 表的计数与状态
        for (pan, lookup) in results {
            let matched = pan_rows
                .iter_mut()
                .find(|row| row.pan.trim().to_uppercase() == *pan);

            match matched {
                Some(row) => {
                    let (count, status) = PanStatus::derive(lookup);
                    row.gstin_count = count.to_string();
                    row.last_updated = now.clone();
                    row.status = status.to_string();
                    info!("✓ 更新 PAN {} : {} 个 GSTIN, 状态 {}", pan, count, status);
                }
                None => {
                    warn!("⚠️ 结果中的 PAN {} 不在 PAN 表里，跳过", pan);
                }
            }
        }

        // 追加新的 GSTIN 行（相对已有表和本次新增都去重）
        let mut existing: HashSet<String> = gstin_rows
            .iter()
            .map(|row| row.gstin.trim().to_uppercase())
            .collect();
        let mut appended = 0;

        for (pan, lookup) in results {
            for result in lookup {
                if let LookupResult::Gstin { gstin, status, state } = result {
                    if gstin.len() != 15 {
                        continue;
                    }
                    if !existing.insert(gstin.trim().to_uppercase()) {
                        continue;
                    }
                    gstin_rows.push(GstinRow {
                        pan_reference: pan.clone(),
                        gstin: gstin.clone(),
                        gstin_status: status.clone(),
                        state: state.clone(),
                        last_updated: now.clone(),
                        ..Default::default()
                    });
                    appended += 1;
                }
            }
        }
        if appended > 0 {
            info!("✓ GSTIN 表新增 {} 条记录", appended);
        }

        self.write_sheets_to(&self.path, pan_rows, gstin_rows)?;
        info!(
            "✓ 已保存结果: {} 个 PAN, {} 条 GSTIN",
            pan_rows.len(),
            gstin_rows.len()
        );

        Ok(())
    }

    /// 把单个 GSTIN 的详情补充到 GSTIN 表
    ///
    /// 只覆盖详情里非空的字段，表里已有的内容不会被空值冲掉。
    ///
    /// # 返回
    /// GSTIN 在表中不存在时返回 Ok(false)
    pub fn update_gstin_details(
        &self,
        gstin: &str,
        details: &GstinDetails,
    ) -> Result<bool, AppError> {
        let (pan_rows, mut gstin_rows) = self.validate_and_load()?;

        let target = gstin.trim().to_uppercase();
        let row = match gstin_rows
            .iter_mut()
            .find(|row| row.gstin.trim().to_uppercase() == target)
        {
            Some(row) => row,
            None => {
                warn!("⚠️ GSTIN {} 不在 GSTIN 表中", gstin);
                return Ok(false);
            }
        };

        if !details.trade_name.is_empty() {
            row.trade_name = details.trade_name.clone();
            info!("✓ 更新商号: {}", details.trade_name);
        } else {
            warn!("⚠️ 详情中没有商号");
        }

        if !details.registration_date.is_empty() {
            row.registration_date = details.registration_date.clone();
            info!("✓ 更新注册日期: {}", details.registration_date);
        } else {
            warn!("⚠️ 详情中没有注册日期");
        }

        if !details.hsn_codes.is_empty() {
            row.hsn_codes = details.hsn_codes.join(", ");
            info!("✓ 更新 HSN 编码: {}", row.hsn_codes);
        } else {
            warn!("⚠️ 详情中没有 HSN 编码");
        }

        row.last_updated = time::now_iso();

        self.write_sheets_to(&self.path, &pan_rows, &gstin_rows)?;
        info!("✓ GSTIN {} 详情已写入 {}", gstin, self.path.display());
        Ok(true)
    }

    // ========== 落盘 ==========

    /// 带时间戳的备份文件路径（与原文件同目录）
    fn backup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("workbook");
        let ext = self
            .path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("xlsx");
        self.path
            .with_file_name(format!("{}_backup_{}.{}", stem, time::now_compact(), ext))
    }

    /// 把两张表整体写入目标文件
    fn write_sheets_to(
        &self,
        target: &Path,
        pan_rows: &[PanRow],
        gstin_rows: &[GstinRow],
    ) -> Result<(), StorageError> {
        let mut workbook = Workbook::new();
        fill_workbook(&mut workbook, pan_rows, gstin_rows)
            .and_then(|_| workbook.save(target))
            .map_err(|e| StorageError::excel_write(target.display().to_string(), e))?;
        Ok(())
    }
}

/// 填充两张表的全部单元格
fn fill_workbook(
    workbook: &mut Workbook,
    pan_rows: &[PanRow],
    gstin_rows: &[GstinRow],
) -> Result<(), rust_xlsxwriter::XlsxError> {
    let pan_sheet = workbook.add_worksheet();
    pan_sheet.set_name(PAN_SHEET)?;
    for (col, header) in PAN_COLUMNS.iter().enumerate() {
        pan_sheet.write_string(0, col as u16, *header)?;
    }
    for (i, row) in pan_rows.iter().enumerate() {
        let r = (i + 1) as u32;
        pan_sheet.write_string(r, 0, &row.pan)?;
        pan_sheet.write_string(r, 1, &row.name)?;
        pan_sheet.write_string(r, 2, &row.email)?;
        pan_sheet.write_string(r, 3, &row.phone)?;
        pan_sheet.write_string(r, 4, &row.address)?;
        // 计数列尽量保持数值类型，方便在表里筛选求和
        match row.gstin_count.parse::<f64>() {
            Ok(count) => pan_sheet.write_number(r, 5, count)?,
            Err(_) => pan_sheet.write_string(r, 5, &row.gstin_count)?,
        };
        pan_sheet.write_string(r, 6, &row.last_updated)?;
        pan_sheet.write_string(r, 7, &row.status)?;
    }

    let gstin_sheet = workbook.add_worksheet();
    gstin_sheet.set_name(GSTIN_SHEET)?;
    for (col, header) in GSTIN_COLUMNS.iter().enumerate() {
        gstin_sheet.write_string(0, col as u16, *header)?;
    }
    for (i, row) in gstin_rows.iter().enumerate() {
        let r = (i + 1) as u32;
        gstin_sheet.write_string(r, 0, &row.pan_reference)?;
        gstin_sheet.write_string(r, 1, &row.gstin)?;
        gstin_sheet.write_string(r, 2, &row.gstin_status)?;
        gstin_sheet.write_string(r, 3, &row.state)?;
        gstin_sheet.write_string(r, 4, &row.trade_name)?;
        gstin_sheet.write_string(r, 5, &row.registration_date)?;
        gstin_sheet.write_string(r, 6, &row.hsn_codes)?;
        gstin_sheet.write_string(r, 7, &row.last_updated)?;
    }

    Ok(())
}

/// 按表头解析 PAN 表
fn parse_pan_sheet(range: &Range<Data>) -> Vec<PanRow> {
    let column_of = header_index(range);
    let mut rows = Vec::new();

    for row in range.rows().skip(1) {
        let get = |name: &str| {
            column_of(name)
                .and_then(|c| row.get(c))
                .map(cell_to_string)
                .unwrap_or_default()
        };
        rows.push(PanRow {
            pan: get("PAN"),
            name: get("Name"),
            email: get("Email"),
            phone: get("Phone"),
            address: get("Address"),
            gstin_count: get("GSTIN_Count"),
            last_updated: get("Last_Updated"),
            status: get("Status"),
        });
    }
    rows
}

/// 按表头解析 GSTIN 表
fn parse_gstin_sheet(range: &Range<Data>) -> Vec<GstinRow> {
    let column_of = header_index(range);
    let mut rows = Vec::new();

    for row in range.rows().skip(1) {
        let get = |name: &str| {
            column_of(name)
                .and_then(|c| row.get(c))
                .map(cell_to_string)
                .unwrap_or_default()
        };
        rows.push(GstinRow {
            pan_reference: get("PAN_Reference"),
            gstin: get("GSTIN"),
            gstin_status: get("GSTIN_Status"),
            state: get("State"),
            trade_name: get("Trade_Name"),
            registration_date: get("Registration_Date"),
            hsn_codes: get("HSN_Codes"),
            last_updated: get("Last_Updated"),
        });
    }
    rows
}

/// 表头名 -> 列下标（大小写不敏感）
fn header_index(range: &Range<Data>) -> impl Fn(&str) -> Option<usize> {
    let headers: Vec<String> = range
        .rows()
        .next()
        .map(|row| row.iter().map(cell_to_string).collect())
        .unwrap_or_default();
    move |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    }
}

/// 旧版表头启发式匹配：先精确、再包含、最后查别名表
fn find_legacy_column(headers: &[String], exact: &str, aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let upper = h.trim().to_uppercase();
        upper == exact || upper.contains(exact) || aliases.contains(&upper.as_str())
    })
}

/// 单元格转字符串
///
/// 整数值的浮点单元格去掉小数部分，PAN/GSTIN 这类文本列不会出现 "123.0"。
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 生成旧版单表测试文件
    fn write_legacy_workbook(path: &Path, rows: &[(&str, &str)]) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "PAN_Number").unwrap();
        sheet.write_string(0, 1, "Name").unwrap();
        for (i, (pan, name)) in rows.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, *pan).unwrap();
            sheet.write_string(r, 1, *name).unwrap();
        }
        workbook.save(path).unwrap();
    }

    /// 生成两表结构测试文件
    fn write_two_sheet_workbook(path: &Path, pan_rows: &[PanRow], gstin_rows: &[GstinRow]) {
        SpreadsheetStore::new(path)
            .write_sheets_to(path, pan_rows, gstin_rows)
            .unwrap();
    }

    fn pan_row(pan: &str) -> PanRow {
        PanRow {
            pan: pan.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpreadsheetStore::new(dir.path().join("absent.xlsx"));
        let err = store.validate_and_load().unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pans.txt");
        fs::write(&path, b"not excel").unwrap();
        let store = SpreadsheetStore::new(&path);
        let err = store.validate_and_load().unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::UnsupportedExtension { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_missing_pan_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pans.xlsx");

        // 两表结构齐全但 PAN 表没有 PAN 列
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(PAN_SHEET).unwrap();
        sheet.write_string(0, 0, "Name").unwrap();
        sheet.write_string(1, 0, "某人").unwrap();
        let gstin = workbook.add_worksheet();
        gstin.set_name(GSTIN_SHEET).unwrap();
        gstin.write_string(0, 0, "GSTIN").unwrap();
        workbook.save(&path).unwrap();

        let store = SpreadsheetStore::new(&path);
        let err = store.validate_and_load().unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::PanColumnMissing { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_pan_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pans.xlsx");
        write_two_sheet_workbook(&path, &[pan_row(""), pan_row("  ")], &[]);

        let store = SpreadsheetStore::new(&path);
        let err = store.validate_and_load().unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::PanColumnEmpty { .. })
        ));
    }

    #[test]
    fn test_legacy_migration_dedups_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.xlsx");
        write_legacy_workbook(
            &path,
            &[
                ("AAAAA0000A", "甲"),
                ("AAAAA0000A", "甲重复"),
                ("not-a-pan", "乙"),
            ],
        );

        let store = SpreadsheetStore::new(&path);
        let (pan_rows, gstin_rows) = store.validate_and_load().unwrap();

        assert_eq!(pan_rows.len(), 1);
        assert_eq!(pan_rows[0].pan, "AAAAA0000A");
        assert_eq!(pan_rows[0].name, "甲");
        assert!(gstin_rows.is_empty());

        // 迁移结果已写回：重新加载走两表路径，内容一致
        let (reloaded, _) = store.validate_and_load().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].pan, "AAAAA0000A");
    }

    #[test]
    fn test_legacy_migration_carries_gstin_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "pan no").unwrap();
        sheet.write_string(0, 1, "GST_NUMBER").unwrap();
        sheet.write_string(0, 2, "GSTIN Status").unwrap();
        sheet.write_string(0, 3, "State").unwrap();
        sheet.write_string(1, 0, "abcde1234f").unwrap();
        sheet.write_string(1, 1, "27ABCDE1234F1Z5").unwrap();
        sheet.write_string(1, 2, "Active").unwrap();
        sheet.write_string(1, 3, "Maharashtra").unwrap();
        workbook.save(&path).unwrap();

        let store = SpreadsheetStore::new(&path);
        let (pan_rows, gstin_rows) = store.validate_and_load().unwrap();

        assert_eq!(pan_rows.len(), 1);
        assert_eq!(pan_rows[0].pan, "ABCDE1234F");
        assert_eq!(gstin_rows.len(), 1);
        assert_eq!(gstin_rows[0].pan_reference, "ABCDE1234F");
        assert_eq!(gstin_rows[0].gstin, "27ABCDE1234F1Z5");
        assert_eq!(gstin_rows[0].gstin_status, "Active");
        assert_eq!(gstin_rows[0].state, "Maharashtra");
        assert!(!gstin_rows[0].last_updated.is_empty());
    }

    #[test]
    fn test_extract_pan_numbers_order_and_dedup() {
        let rows = vec![
            pan_row(" abcde1234f "),
            pan_row("FGHIJ5678K"),
            pan_row("ABCDE1234F"),
            pan_row("bogus"),
            pan_row(""),
        ];
        let (pans, index_map) = SpreadsheetStore::extract_pan_numbers(&rows);

        assert_eq!(pans, vec!["ABCDE1234F".to_string(), "FGHIJ5678K".to_string()]);
        assert_eq!(index_map["ABCDE1234F"], 0);
        assert_eq!(index_map["FGHIJ5678K"], 1);
    }

    #[test]
    fn test_reconcile_updates_status_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pans.xlsx");
        let mut pan_rows = vec![pan_row("ABCDE1234F"), pan_row("FGHIJ5678K")];
        let mut gstin_rows = Vec::new();
        write_two_sheet_workbook(&path, &pan_rows, &gstin_rows);

        let mut results = BTreeMap::new();
        results.insert(
            "ABCDE1234F".to_string(),
            vec![LookupResult::Gstin {
                gstin: "27ABCDE1234F1Z5".to_string(),
                status: "Active".to_string(),
                state: "Maharashtra".to_string(),
            }],
        );
        results.insert("FGHIJ5678K".to_string(), vec![LookupResult::NoRecords]);

        let store = SpreadsheetStore::new(&path);
        store
            .reconcile(&mut pan_rows, &mut gstin_rows, &results)
            .unwrap();

        assert_eq!(pan_rows[0].status, "Success");
        assert_eq!(pan_rows[0].gstin_count, "1");
        assert_eq!(pan_rows[1].status, "No GSTINs found");
        assert_eq!(pan_rows[1].gstin_count, "0");
        assert_eq!(gstin_rows.len(), 1);
        assert_eq!(gstin_rows[0].pan_reference, "ABCDE1234F");

        // 落盘内容与内存一致
        let (saved_pans, saved_gstins) = store.validate_and_load().unwrap();
        assert_eq!(saved_pans[0].status, "Success");
        assert_eq!(saved_gstins.len(), 1);

        // 备份文件存在且保留了合并前的状态（GSTIN 表为空）
        let backup = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().contains("_backup_"))
            .unwrap();
        let (_, backup_gstins) = SpreadsheetStore::new(backup.path()).validate_and_load().unwrap();
        assert!(backup_gstins.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pans.xlsx");
        let mut pan_rows = vec![pan_row("ABCDE1234F")];
        let mut gstin_rows = Vec::new();
        write_two_sheet_workbook(&path, &pan_rows, &gstin_rows);

        let mut results = BTreeMap::new();
        results.insert(
            "ABCDE1234F".to_string(),
            vec![LookupResult::Gstin {
                gstin: "27ABCDE1234F1Z5".to_string(),
                status: "Active".to_string(),
                state: "Maharashtra".to_string(),
            }],
        );

        let store = SpreadsheetStore::new(&path);
        store
            .reconcile(&mut pan_rows, &mut gstin_rows, &results)
            .unwrap();
        assert_eq!(gstin_rows.len(), 1);

        // 同一批结果再合并一次，GSTIN 行数不变
        store
            .reconcile(&mut pan_rows, &mut gstin_rows, &results)
            .unwrap();
        assert_eq!(gstin_rows.len(), 1);
        assert_eq!(pan_rows.len(), 1);

        let (_, saved_gstins) = store.validate_and_load().unwrap();
        assert_eq!(saved_gstins.len(), 1);
    }

    #[test]
    fn test_reconcile_dedups_within_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pans.xlsx");
        let mut pan_rows = vec![pan_row("ABCDE1234F"), pan_row("FGHIJ5678K")];
        let mut gstin_rows = Vec::new();
        write_two_sheet_workbook(&path, &pan_rows, &gstin_rows);

        // 两个 PAN 返回同一个 GSTIN，只应入表一次
        let shared = LookupResult::Gstin {
            gstin: "27ABCDE1234F1Z5".to_string(),
            status: "Active".to_string(),
            state: "Maharashtra".to_string(),
        };
        let mut results = BTreeMap::new();
        results.insert("ABCDE1234F".to_string(), vec![shared.clone()]);
        results.insert("FGHIJ5678K".to_string(), vec![shared]);

        let store = SpreadsheetStore::new(&path);
        store
            .reconcile(&mut pan_rows, &mut gstin_rows, &results)
            .unwrap();
        assert_eq!(gstin_rows.len(), 1);
    }

    #[test]
    fn test_reconcile_records_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pans.xlsx");
        let mut pan_rows = vec![pan_row("ABCDE1234F")];
        let mut gstin_rows = Vec::new();
        write_two_sheet_workbook(&path, &pan_rows, &gstin_rows);

        let mut results = BTreeMap::new();
        results.insert(
            "ABCDE1234F".to_string(),
            vec![LookupResult::Error {
                message: "Failed to solve captcha".to_string(),
            }],
        );

        let store = SpreadsheetStore::new(&path);
        store
            .reconcile(&mut pan_rows, &mut gstin_rows, &results)
            .unwrap();
        assert_eq!(pan_rows[0].status, "Error: Failed to solve captcha");
        assert_eq!(pan_rows[0].gstin_count, "0");
    }

    #[test]
    fn test_update_gstin_details() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pans.xlsx");
        let gstin_rows = vec![GstinRow {
            pan_reference: "ABCDE1234F".to_string(),
            gstin: "27ABCDE1234F1Z5".to_string(),
            gstin_status: "Active".to_string(),
            ..Default::default()
        }];
        write_two_sheet_workbook(&path, &[pan_row("ABCDE1234F")], &gstin_rows);

        let details = GstinDetails {
            gstin: "27ABCDE1234F1Z5".to_string(),
            trade_name: "Acme Traders".to_string(),
            registration_date: "01/07/2017".to_string(),
            hsn_codes: vec!["9983".to_string(), "8471".to_string()],
        };

        let store = SpreadsheetStore::new(&path);
        assert!(store.update_gstin_details("27ABCDE1234F1Z5", &details).unwrap());

        let (_, saved) = store.validate_and_load().unwrap();
        assert_eq!(saved[0].trade_name, "Acme Traders");
        assert_eq!(saved[0].registration_date, "01/07/2017");
        assert_eq!(saved[0].hsn_codes, "9983, 8471");
        // 详情没提供的字段保持原值
        assert_eq!(saved[0].gstin_status, "Active");

        // 不存在的 GSTIN 返回 false
        assert!(!store.update_gstin_details("99ZZZZZ9999Z9Z9", &details).unwrap());
    }
}
