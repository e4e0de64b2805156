// src/export.rs
//
// Text renderings of tabular data for download: spreadsheet-friendly CSV and
// an HTML table that Excel opens as a workbook.

use crate::normalize::NormalizedSheet;

const UTF8_BOM: char = '\u{FEFF}';

pub const ATTENDANCE_TABLE_HEADERS: [&str; 3] = ["姓名", "出勤率", "狀態"];

// --- CSV ---

fn needs_quoting(value: &str) -> bool {
    value.contains(['\n', '\r', '\t', ',', '"'])
}

fn csv_field(value: &str) -> String {
    if needs_quoting(value) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line<S: AsRef<str>>(cells: &[S]) -> String {
    cells
        .iter()
        .map(|c| csv_field(c.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// BOM-prefixed CSV, lines joined by `\n`, no trailing newline.
pub fn to_csv<H, C>(headers: &[H], rows: &[Vec<C>]) -> String
where
    H: AsRef<str>,
    C: AsRef<str>,
{
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(csv_line(headers));
    lines.extend(rows.iter().map(|row| csv_line(row.as_slice())));

    let mut out = String::new();
    out.push(UTF8_BOM);
    out.push_str(&lines.join("\n"));
    out
}

// --- Excel HTML ---

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn to_excel_html<H, C>(headers: &[H], rows: &[Vec<C>], sheet_name: &str) -> String
where
    H: AsRef<str>,
    C: AsRef<str>,
{
    let sheet_name = escape_html(sheet_name);
    let mut html = String::new();
    html.push_str(
        "<html xmlns:o=\"urn:schemas-microsoft-com:office:office\" \
         xmlns:x=\"urn:schemas-microsoft-com:office:excel\" \
         xmlns=\"http://www.w3.org/TR/REC-html40\">\n",
    );
    html.push_str("<head><meta charset=\"UTF-8\">");
    html.push_str(&format!(
        "<!--[if gte mso 9]><xml><x:ExcelWorkbook><x:ExcelWorksheets><x:ExcelWorksheet>\
         <x:Name>{}</x:Name><x:WorksheetOptions><x:DisplayGridlines/></x:WorksheetOptions>\
         </x:ExcelWorksheet></x:ExcelWorksheets></x:ExcelWorkbook></xml><![endif]-->",
        sheet_name
    ));
    html.push_str(&format!("<title>{}</title></head>\n<body>\n<table border=\"1\">\n", sheet_name));

    html.push_str("<thead><tr>");
    for header in headers {
        html.push_str(&format!("<th>{}</th>", escape_html(header.as_ref())));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            // Keep leading zeros and date-like text as typed
            html.push_str(&format!(
                "<td style=\"mso-number-format:'\\@'\">{}</td>",
                escape_html(cell.as_ref())
            ));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    html
}

// --- Table Builders ---

/// Display headers and raw cell rows of a normalized sheet.
pub fn sheet_table(sheet: &NormalizedSheet) -> (Vec<String>, Vec<Vec<String>>) {
    let width = sheet.headers.len();
    let rows = sheet
        .rows
        .iter()
        .map(|row| (0..width).map(|i| row.cell(i).to_string()).collect())
        .collect();
    (sheet.headers.clone(), rows)
}

/// Per-row attendance table; rows without a computed summary are skipped.
pub fn attendance_table(sheet: &NormalizedSheet) -> (Vec<String>, Vec<Vec<String>>) {
    let headers = ATTENDANCE_TABLE_HEADERS.iter().map(|h| h.to_string()).collect();
    let rows = sheet
        .rows
        .iter()
        .filter_map(|row| {
            let summary = row.attendance.as_ref()?;
            Some(vec![
                row.name().to_string(),
                summary.display(),
                summary.status.label().to_string(),
            ])
        })
        .collect();
    (headers, rows)
}
