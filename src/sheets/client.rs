//! Google Sheets v4 worksheet.

use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};
use std::mem;
use std::rc::Rc;
use url::Url;

use crate::auth::AccessTokenProvider;
use crate::error::{ServiceError, ServiceResult};
use crate::google::GoogleApi;
use crate::sheets::{CellValue, Worksheet};

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/";

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// `1 -> A`, `27 -> AA`.
pub fn column_letters(mut col: usize) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Sheet title quoted for A1 notation.
pub fn quoted_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

pub fn a1_cell(title: &str, row: usize, col: usize) -> String {
    format!("{}!{}{}", quoted_title(title), column_letters(col), row)
}

fn cell_json(value: &CellValue) -> Value {
    match value {
        CellValue::Text(s) => Value::String(s.clone()),
        CellValue::Number(n) => Value::from(*n),
    }
}

/// `values.batchUpdate` body with one range per cell, so cells not written
/// keep whatever they hold.
pub fn batch_update_body(title: &str, cells: &[(usize, usize, CellValue)]) -> Value {
    let data: Vec<Value> = cells
        .iter()
        .map(|(row, col, value)| {
            json!({
                "range": a1_cell(title, *row, *col),
                "values": [[cell_json(value)]],
            })
        })
        .collect();
    json!({
        "valueInputOption": "USER_ENTERED",
        "data": data,
    })
}

/// The first worksheet of a spreadsheet, opened once per run.
pub struct GoogleWorksheet {
    api: GoogleApi,
    base: Url,
    spreadsheet_id: String,
    title: String,
    pending: Vec<(usize, usize, CellValue)>,
}

impl GoogleWorksheet {
    pub fn open_first(
        tokens: Rc<dyn AccessTokenProvider>,
        spreadsheet_id: &str,
    ) -> ServiceResult<Self> {
        Self::open_first_at(tokens, spreadsheet_id, SHEETS_API_BASE)
    }

    pub fn open_first_at(
        tokens: Rc<dyn AccessTokenProvider>,
        spreadsheet_id: &str,
        base: &str,
    ) -> ServiceResult<Self> {
        let base = Url::parse(base).map_err(|e| ServiceError::Decode {
            service: "sheets",
            message: format!("bad API base {base}: {e}"),
        })?;
        let mut sheet = Self {
            api: GoogleApi::new("sheets", tokens),
            base,
            spreadsheet_id: spreadsheet_id.to_string(),
            title: String::new(),
            pending: Vec::new(),
        };

        let mut url = sheet.url(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let meta: SpreadsheetMeta = sheet.api.get_json(url)?;

        sheet.title = meta
            .sheets
            .into_iter()
            .next()
            .map(|s| s.properties.title)
            .ok_or_else(|| ServiceError::Decode {
                service: "sheets",
                message: format!("spreadsheet {spreadsheet_id} has no worksheets"),
            })?;
        debug!("opened worksheet {:?}", sheet.title);
        Ok(sheet)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn url(&self, extra: &[&str]) -> ServiceResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Decode {
                service: "sheets",
                message: "API base cannot hold a path".to_string(),
            })?
            .pop_if_empty()
            .extend(["spreadsheets", self.spreadsheet_id.as_str()])
            .extend(extra);
        Ok(url)
    }
}

impl Worksheet for GoogleWorksheet {
    fn num_rows(&mut self) -> ServiceResult<usize> {
        let range = quoted_title(&self.title);
        let url = self.url(&["values", range.as_str()])?;
        let values: ValueRange = self.api.get_json(url)?;
        Ok(values.values.len())
    }

    fn set(&mut self, row: usize, col: usize, value: CellValue) {
        self.pending.push((row, col, value));
    }

    fn save(&mut self) -> ServiceResult<()> {
        let cells = mem::take(&mut self.pending);
        if cells.is_empty() {
            return Ok(());
        }
        let url = self.url(&["values:batchUpdate"])?;
        let _: Value = self
            .api
            .post_json(url, &batch_update_body(&self.title, &cells))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(4), "D");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(703), "AAA");
    }

    #[test]
    fn titles_are_quoted() {
        assert_eq!(a1_cell("Sheet1", 5, 3), "'Sheet1'!C5");
        assert_eq!(a1_cell("Bob's pay", 1, 1), "'Bob''s pay'!A1");
    }

    #[test]
    fn batch_body_has_one_range_per_cell() {
        let body = batch_update_body(
            "シート1",
            &[
                (9, 1, CellValue::Text("2023/12/01 10:15:30".into())),
                (9, 3, CellValue::Number(12345)),
            ],
        );
        assert_eq!(
            body,
            json!({
                "valueInputOption": "USER_ENTERED",
                "data": [
                    {"range": "'シート1'!A9", "values": [["2023/12/01 10:15:30"]]},
                    {"range": "'シート1'!C9", "values": [[12345]]},
                ],
            })
        );
    }

    #[test]
    fn value_range_without_values_is_empty() {
        let v: ValueRange =
            serde_json::from_str(r#"{"range":"'Sheet1'!A1:Z1000","majorDimension":"ROWS"}"#)
                .unwrap();
        assert!(v.values.is_empty());
    }

    #[test]
    fn first_sheet_title_is_read_from_metadata() {
        let meta: SpreadsheetMeta = serde_json::from_str(
            r#"{"sheets":[{"properties":{"title":"2023"}},{"properties":{"title":"old"}}]}"#,
        )
        .unwrap();
        assert_eq!(meta.sheets[0].properties.title, "2023");
    }
}
