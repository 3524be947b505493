//! Integration tests for the dataset fetcher
//!
//! Covers:
//! - JSON-stat POST queries
//! - Latin-1 semicolon CSV downloads
//! - Transport, status, decode, and empty-dataset failures
//! - Excel workbook downloads

use odp_common::artifact::CsvOptions;
use odp_common::Cell;
use odp_ingest::fetch::{FetchErrorKind, FetchRequest, Fetched, Fetcher, ResponseKind};
use serde_json::json;
use std::io::{Cursor, Write};
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn jsonstat_body(values: serde_json::Value) -> serde_json::Value {
    json!({
        "class": "dataset",
        "id": ["Region", "Tid"],
        "size": [2, 1],
        "dimension": {
            "Region": {
                "label": "region",
                "category": {
                    "index": {"4001": 0, "4003": 1},
                    "label": {"4001": "Porsgrunn", "4003": "Skien"}
                }
            },
            "Tid": {"label": "år", "category": {"index": {"2024": 0}}}
        },
        "value": values
    })
}

#[tokio::test]
async fn test_jsonstat_post_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/no/table/09817"))
        .and(body_partial_json(json!({"response": {"format": "json-stat2"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(jsonstat_body(json!([12.5, 7]))))
        .expect(1)
        .mount(&server)
        .await;

    let request = FetchRequest::post(
        format!("{}/api/v0/no/table/09817", server.uri()),
        json!({"query": [], "response": {"format": "json-stat2"}}),
        ResponseKind::JsonStat,
    );
    let table = Fetcher::new().fetch_table(&request).await.unwrap();

    assert_eq!(table.headers(), vec!["region", "år", "value"]);
    assert_eq!(
        table.row(0).unwrap(),
        vec![&Cell::from("Porsgrunn"), &Cell::from("2024"), &Cell::Real(12.5)]
    );
    assert_eq!(table.row(1).unwrap()[2], &Cell::Int(7));
}

#[tokio::test]
async fn test_jsonstat_all_null_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jsonstat_body(json!([null, null]))))
        .mount(&server)
        .await;

    let request = FetchRequest::get(server.uri(), ResponseKind::JsonStat);
    let err = Fetcher::new().fetch(&request).await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Empty);
    assert!(err.is_empty());
}

#[tokio::test]
async fn test_latin1_csv_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"Kommune;\xc5r;Andel\nB\xf8;2024;12,5\n".to_vec()),
        )
        .mount(&server)
        .await;

    let request = FetchRequest::get(
        format!("{}/data.csv", server.uri()),
        ResponseKind::Csv(CsvOptions::default()),
    );
    let table = Fetcher::new().fetch_table(&request).await.unwrap();

    assert_eq!(table.headers(), vec!["Kommune", "År", "Andel"]);
    assert_eq!(
        table.row(0).unwrap(),
        vec![&Cell::from("Bø"), &Cell::from("2024"), &Cell::from("12.5")]
    );
}

#[tokio::test]
async fn test_header_only_csv_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Kommune;Antall\n"))
        .mount(&server)
        .await;

    let request = FetchRequest::get(server.uri(), ResponseKind::Csv(CsvOptions::default()));
    let err = Fetcher::new().fetch(&request).await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Empty);
}

#[tokio::test]
async fn test_server_error_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&server)
        .await;

    let request = FetchRequest::get(server.uri(), ResponseKind::RawJson);
    let err = Fetcher::new().fetch(&request).await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Transport);
    assert!(err.to_string().contains("503"));
    assert!(err.to_string().contains("maintenance"));
}

#[tokio::test]
async fn test_unreachable_host_is_transport_failure() {
    let request = FetchRequest::get("http://127.0.0.1:9/nothing", ResponseKind::RawJson);
    let err = Fetcher::new().fetch(&request).await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Transport);
}

#[tokio::test]
async fn test_malformed_json_is_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let request = FetchRequest::get(server.uri(), ResponseKind::JsonStat);
    let err = Fetcher::new().fetch(&request).await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Decode);
    assert_eq!(err.url(), server.uri());
}

#[tokio::test]
async fn test_raw_json_passthrough() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [1, 2]})))
        .mount(&server)
        .await;

    let value = Fetcher::new().fetch_json(&server.uri(), None).await.unwrap();
    assert_eq!(value, json!({"items": [1, 2]}));
}

#[tokio::test]
async fn test_html_table_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<table><tr><th>Kommune</th><th>Antall</th></tr><tr><td>Skien</td><td>4</td></tr></table>",
        ))
        .mount(&server)
        .await;

    let request = FetchRequest::get(server.uri(), ResponseKind::HtmlTable { index: 0 });
    match Fetcher::new().fetch(&request).await.unwrap() {
        Fetched::Table(table) => {
            assert_eq!(table.headers(), vec!["Kommune", "Antall"]);
            assert_eq!(table.len(), 1);
        },
        other => panic!("expected a table, got {other:?}"),
    }
}

/// Minimal one-sheet `.xlsx` with inline string cells
fn workbook(sheet_name: &str, sheet_data: &str) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    let parts = [
        (
            "xl/workbook.xml",
            format!(
                r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{sheet_name}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
            ),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_data}</sheetData></worksheet>"#
            ),
        ),
    ];
    for (name, xml) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_excel_workbook_download() {
    let server = MockServer::start().await;
    let sheet = concat!(
        r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Kommune</t></is></c><c r="B1" t="inlineStr"><is><t>Antall</t></is></c></row>"#,
        r#"<row r="2"><c r="A2" t="inlineStr"><is><t>Notodden</t></is></c><c r="B2"><v>312</v></c></row>"#,
    );
    Mock::given(method("GET"))
        .and(path("/statistikk/sysselsetting.xlsx"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(workbook("Ark1", sheet), "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/statistikk/sysselsetting.xlsx", server.uri());
    let sheets = Fetcher::new().fetch_workbook(&url).await.unwrap();

    let table = &sheets["Ark1"];
    assert_eq!(table.headers(), vec!["Kommune", "Antall"]);
    assert_eq!(table.row(0).unwrap(), vec![&Cell::from("Notodden"), &Cell::Int(312)]);
}

#[tokio::test]
async fn test_excel_non_workbook_is_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Kommune;Antall\nSkien;4\n"))
        .mount(&server)
        .await;

    let err = Fetcher::new().fetch_workbook(&server.uri()).await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Decode);
}
