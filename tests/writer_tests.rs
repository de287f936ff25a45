//! Writer integration tests: field mapping, value resolution, stream writes

use gtmpl_value::{FuncError, Value};
use pretty_assertions::assert_eq;
use serde_json::json;
use sheetmap::mapping::{compile_field_map, resolve_value};
use sheetmap::template::{fen2yuan, FunctionTable};
use sheetmap::writer::{next_row_number, remove_row, write_records};
use sheetmap::{CellKind, CellValue, DataRecord, FieldEntry, SheetMapError, Spreadsheet, XlsxWorkbook};
use tempfile::TempDir;

fn fixture(rows: Vec<Vec<&str>>) -> XlsxWorkbook {
    let mut book = XlsxWorkbook::new("fixture.xlsx");
    book.add_sheet("Sheet1");
    book.set_rows(
        "Sheet1",
        rows.into_iter()
            .map(|r| r.into_iter().map(CellValue::from).collect())
            .collect(),
    )
    .unwrap();
    book
}

fn records(value: serde_json::Value) -> Vec<DataRecord> {
    serde_json::from_value(value).unwrap()
}

fn single(value: serde_json::Value) -> DataRecord {
    serde_json::from_value(value).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// FIELD MAPPING + VALUE RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_literal_fallback_returns_header_text() {
    let entry = FieldEntry::Literal("Name".to_string());
    assert_eq!(
        resolve_value(&entry, &single(json!({"Other": "x"}))).unwrap(),
        CellValue::from("Name")
    );
}

#[test]
fn test_fen2yuan_conversions() {
    let book = fixture(vec![vec!["{{.v | fen2yuan}}"], vec!["sample"]]);
    let map = compile_field_map(&book, "Sheet1", &FunctionTable::builtin()).unwrap();
    let entry = map.get(1).unwrap();

    let cases = [
        (json!(12345), "123.45"),
        (json!("50"), "0.50"),
        (json!("abc"), "abc"),
        (json!(-7), "-0.07"),
    ];
    for (input, expected) in cases {
        assert_eq!(
            resolve_value(entry, &single(json!({ "v": input }))).unwrap(),
            CellValue::from(expected),
            "input {}",
            input
        );
    }
}

#[test]
fn test_fen2yuan_called_directly() {
    assert_eq!(
        fen2yuan(&[Value::from(100i64)]).unwrap(),
        Value::String("1.00".to_string())
    );
    assert!(fen2yuan(&[]).is_err());
}

#[test]
fn test_header_classification() {
    let book = fixture(vec![
        vec!["id", "{{.name}}", "={{.a}}+{{.b}}", ""],
        vec!["sample"],
    ]);
    let map = compile_field_map(&book, "Sheet1", &FunctionTable::builtin()).unwrap();

    assert_eq!(map.len(), 4);
    assert!(matches!(map.get(1), Some(FieldEntry::Literal(s)) if s == "id"));
    assert!(matches!(
        map.get(2),
        Some(FieldEntry::Template { kind: CellKind::ComputedString, .. })
    ));
    assert!(matches!(
        map.get(3),
        Some(FieldEntry::Template { kind: CellKind::Formula, .. })
    ));
    assert!(matches!(map.get(4), Some(FieldEntry::Literal(s)) if s.is_empty()));
}

#[test]
fn test_custom_function_table() {
    fn shout(args: &[Value]) -> Result<Value, FuncError> {
        match args {
            [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
            _ => Err(FuncError::ExactlyXArgs("shout".to_string(), 1)),
        }
    }

    let book = fixture(vec![vec!["{{.name | shout}}"], vec!["sample"]]);
    assert!(matches!(
        compile_field_map(&book, "Sheet1", &FunctionTable::builtin()),
        Err(SheetMapError::TemplateCompile { column: 1, .. })
    ));

    let functions = FunctionTable::builtin().with("shout", shout);
    let map = compile_field_map(&book, "Sheet1", &functions).unwrap();
    assert_eq!(
        resolve_value(map.get(1).unwrap(), &single(json!({"name": "ada"}))).unwrap(),
        CellValue::from("ADA")
    );
}

#[test]
fn test_insufficient_rows() {
    let book = fixture(vec![vec!["id"]]);
    assert!(matches!(
        compile_field_map(&book, "Sheet1", &FunctionTable::builtin()),
        Err(SheetMapError::InsufficientRows { found: 1, .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// STREAM WRITES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_write_keeps_existing_rows() {
    let mut book = fixture(vec![
        vec!["id", "{{.amount | fen2yuan}}"],
        vec!["legacy", "9.99"],
    ]);
    let map = compile_field_map(&book, "Sheet1", &FunctionTable::builtin()).unwrap();
    let row = next_row_number(&book, "Sheet1").unwrap();
    assert_eq!(row, 3);

    let next = write_records(
        &mut book,
        "Sheet1",
        row,
        &map,
        &records(json!([{"id": "1", "amount": 500}])),
    )
    .unwrap();
    assert_eq!(next, 4);
    assert_eq!(
        book.rows("Sheet1").unwrap(),
        vec![
            vec!["id", "{{.amount | fen2yuan}}"],
            vec!["legacy", "9.99"],
            vec!["1", "5.00"],
        ]
    );
}

#[test]
fn test_write_over_sample_row() {
    let mut book = fixture(vec![vec!["id", "name"], vec!["sample", "sample"]]);
    let map = compile_field_map(&book, "Sheet1", &FunctionTable::builtin()).unwrap();

    write_records(
        &mut book,
        "Sheet1",
        2,
        &map,
        &records(json!([{"id": 1, "name": "Ada"}, {"id": 2}])),
    )
    .unwrap();
    assert_eq!(
        book.rows("Sheet1").unwrap(),
        vec![vec!["id", "name"], vec!["1", "Ada"], vec!["2", "name"]]
    );
}

#[test]
fn test_formula_column_survives_save() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("formula.xlsx");

    let mut book = XlsxWorkbook::new(&path);
    book.add_sheet("Sheet1");
    book.set_rows(
        "Sheet1",
        vec![
            vec![
                CellValue::from("a"),
                CellValue::from("b"),
                CellValue::from("=A{{.row}}+B{{.row}}"),
            ],
            vec![CellValue::from("sample")],
        ],
    )
    .unwrap();
    let map = compile_field_map(&book, "Sheet1", &FunctionTable::builtin()).unwrap();

    remove_row(&mut book, "Sheet1", 2).unwrap();
    write_records(
        &mut book,
        "Sheet1",
        2,
        &map,
        &records(json!([{"a": 1, "b": 2, "row": 2}])),
    )
    .unwrap();
    assert_eq!(book.cell_value("Sheet1", "C2").unwrap(), CellValue::formula("A2+B2"));
    book.save().unwrap();

    let reopened = XlsxWorkbook::open(&path).unwrap();
    let c2 = reopened.cell_value("Sheet1", "C2").unwrap();
    assert_eq!(c2.formula_text(), Some("A2+B2"));
    assert_eq!(reopened.cell_value("Sheet1", "A2").unwrap().as_text(), "1");
}

#[test]
fn test_dates_and_cached_formulas_survive_write_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("typed.xlsx");

    // Legacy row 2 holds a date and a formula with its last computed value
    let mut book = XlsxWorkbook::new(&path);
    book.add_sheet("Sheet1");
    book.set_rows(
        "Sheet1",
        vec![
            vec![
                CellValue::from("id"),
                CellValue::from("when"),
                CellValue::from("total"),
            ],
            vec![
                CellValue::from("legacy"),
                CellValue::DateTime(45306.0),
                CellValue::Formula {
                    formula: "2+3".to_string(),
                    result: Box::new(CellValue::Number(5.0)),
                },
            ],
        ],
    )
    .unwrap();
    book.save().unwrap();

    let mut book = XlsxWorkbook::open(&path).unwrap();
    let map = compile_field_map(&book, "Sheet1", &FunctionTable::builtin()).unwrap();
    let next = write_records(
        &mut book,
        "Sheet1",
        3,
        &map,
        &records(json!([{"id": "1", "when": "today", "total": 7}])),
    )
    .unwrap();
    assert_eq!(next, 4);
    book.save().unwrap();

    let reopened = XlsxWorkbook::open(&path).unwrap();
    assert_eq!(
        reopened.cell_value("Sheet1", "B2").unwrap(),
        CellValue::DateTime(45306.0)
    );
    let total = reopened.cell_value("Sheet1", "C2").unwrap();
    assert_eq!(total.formula_text(), Some("2+3"));
    assert_eq!(total.as_text(), "5");
    assert_eq!(
        reopened.rows("Sheet1").unwrap(),
        vec![
            vec!["id", "when", "total"],
            vec!["legacy", "2024-01-15", "5"],
            vec!["1", "today", "7"],
        ]
    );
}

#[test]
fn test_template_error_stops_write() {
    let mut book = fixture(vec![vec!["{{.a.b}}"], vec!["sample"]]);
    let map = compile_field_map(&book, "Sheet1", &FunctionTable::builtin()).unwrap();
    let err = write_records(&mut book, "Sheet1", 3, &map, &records(json!([{"a": 5}])))
        .unwrap_err();
    assert!(err.is_template_error());
    assert_eq!(book.rows("Sheet1").unwrap().len(), 2);
}
