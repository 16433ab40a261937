//! Paging and error handling of the remote geometry sources.

use std::io::{Cursor, Write};

use serde_json::{json, Value};
use tractgetter::getter::Getter;
use tractgetter::tiger::{TigerWeb, ZippedGeoJson};
use tractgetter::Error;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUERY_PATH: &str = "/arcgis/rest/services/TIGERweb/Tracts_Blocks/MapServer/0/query";

fn tract(geoid: &str, lon: f64, lat: f64) -> Value {
    let h = 0.004;
    json!({
        "type": "Feature",
        "properties": { "GEOID": geoid, "NAMELSAD": format!("Census Tract {}", &geoid[5..]) },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [lon - h, lat - h], [lon + h, lat - h], [lon + h, lat + h],
                [lon - h, lat + h], [lon - h, lat - h]
            ]]
        }
    })
}

// ArcGIS puts the transfer-limit flag under the collection's properties
fn page(features: Vec<Value>, exceeded: bool) -> Value {
    let mut body = json!({ "type": "FeatureCollection", "features": features });
    if exceeded {
        body["properties"] = json!({ "exceededTransferLimit": true });
    }
    body
}

// Mounted last so the offset-specific mocks take precedence
async fn mount_end_of_results(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], false)))
        .mount(server)
        .await;
}

fn source(server: &MockServer, page_size: usize) -> TigerWeb {
    TigerWeb::new(format!("{}{QUERY_PATH}", server.uri()), page_size, 5).unwrap()
}

#[tokio::test]
async fn pages_until_an_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("where", "STATE='17'"))
        .and(query_param("f", "geojson"))
        .and(query_param("outSR", "4326"))
        .and(query_param("resultOffset", "0"))
        .and(query_param("resultRecordCount", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![
                tract("17031670400", -87.654, 41.766),
                tract("17031670500", -87.640, 41.766),
            ],
            false,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("resultOffset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![tract("17031670600", -87.626, 41.766)],
            false,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("resultOffset", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], false)))
        .expect(1)
        .mount(&server)
        .await;

    let tracts = source(&server, 2).tracts("17").await.unwrap();
    let ids: Vec<_> = tracts.iter().map(|t| t.geoid.as_str()).collect();
    assert_eq!(ids, ["17031670400", "17031670500", "17031670600"]);
}

#[tokio::test]
async fn follows_server_side_transfer_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("resultOffset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![
                tract("17031670400", -87.654, 41.766),
                tract("17031670500", -87.640, 41.766),
            ],
            true,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("resultOffset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![tract("17031670600", -87.626, 41.766)],
            false,
        )))
        .expect(1)
        .mount(&server)
        .await;
    mount_end_of_results(&server).await;

    let features = source(&server, 1000).geojson("17").await.unwrap();
    assert_eq!(features.features.len(), 3);
}

#[tokio::test]
async fn short_page_without_flag_is_not_the_end() {
    let server = MockServer::start().await;
    for (offset, geoid, lon) in [
        ("0", "17001000100", -91.40),
        ("1", "17031670400", -87.654),
    ] {
        Mock::given(method("GET"))
            .and(query_param("resultOffset", offset))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page(vec![tract(geoid, lon, 41.766)], false)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }
    mount_end_of_results(&server).await;

    let tracts = source(&server, 1000).tracts("17").await.unwrap();
    let ids: Vec<_> = tracts.iter().map(|t| t.geoid.as_str()).collect();
    assert_eq!(ids, ["17001000100", "17031670400"]);
}

#[tokio::test]
async fn empty_state_is_data_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], false)))
        .mount(&server)
        .await;

    let err = source(&server, 1000).tracts("17").await.unwrap_err();
    assert!(matches!(err, Error::DataUnavailable { ref state, .. } if state == "17"));
}

#[tokio::test]
async fn arcgis_error_body_is_data_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "code": 400, "message": "Unable to complete operation." }
        })))
        .mount(&server)
        .await;

    let err = source(&server, 1000).geojson("17").await.unwrap_err();
    match err {
        Error::DataUnavailable { reason, .. } => assert!(reason.contains("Unable to complete")),
        other => panic!("expected DataUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn http_failure_is_data_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = source(&server, 1000).geojson("17").await.unwrap_err();
    assert!(matches!(err, Error::DataUnavailable { .. }));
}

#[tokio::test]
async fn malformed_polygon_is_invalid_geometry() {
    let server = MockServer::start().await;
    let mut bad = tract("17031670400", -87.654, 41.766);
    bad["geometry"] = json!({ "type": "LineString", "coordinates": [[-87.65, 41.76], [-87.64, 41.77]] });
    Mock::given(method("GET"))
        .and(query_param("resultOffset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![bad], false)))
        .mount(&server)
        .await;
    mount_end_of_results(&server).await;

    let err = source(&server, 1000).tracts("17").await.unwrap_err();
    assert!(matches!(err, Error::InvalidGeometry { ref geoid, .. } if geoid == "17031670400"));
}

fn zipped(entries: &[(&str, String)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, zip::write::FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[tokio::test]
async fn zipped_download_is_unpacked() {
    let server = MockServer::start().await;
    let collection = page(
        vec![
            tract("17031670500", -87.640, 41.766),
            tract("17031670400", -87.654, 41.766),
        ],
        false,
    );
    let body = zipped(&[
        ("README.txt", "Illinois tracts".to_string()),
        ("tl_2023_17_tract.geojson", collection.to_string()),
    ]);
    Mock::given(method("GET"))
        .and(path("/tl_2023_17_tract.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(1)
        .mount(&server)
        .await;

    let source = ZippedGeoJson::new(
        format!("{}/tl_2023_17_tract.zip", server.uri()),
        "tl_2023_17_tract.geojson",
    );
    let tracts = source.tracts("17").await.unwrap();
    let ids: Vec<_> = tracts.iter().map(|t| t.geoid.as_str()).collect();
    assert_eq!(ids, ["17031670400", "17031670500"]);
}

#[tokio::test]
async fn zipped_download_not_found_is_data_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = ZippedGeoJson::new(format!("{}/missing.zip", server.uri()), "tracts.geojson");
    let err = source.geojson("17").await.unwrap_err();
    assert!(matches!(err, Error::DataUnavailable { ref state, .. } if state == "17"));
}

#[tokio::test]
async fn zipped_download_without_entry_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zipped(&[("README.txt", "no tracts here".to_string())])),
        )
        .mount(&server)
        .await;

    let source = ZippedGeoJson::new(format!("{}/tracts.zip", server.uri()), "tracts.geojson");
    let err = source.geojson("17").await.unwrap_err();
    assert!(matches!(err, Error::Zip(_)));
}
