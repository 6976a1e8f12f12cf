//! Fixture builders shared by the integration tests.
//!
//! Every dataset is generated byte by byte so no binary fixture has to be
//! committed.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{Connection, Executor};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// One dBase column: name, type code, width.
pub type Column<'a> = (&'a str, u8, u8);

const SHP_HEADER_LEN: usize = 100;
const POINT_RECORD_LEN: usize = 28;

fn shp_header(file_len_bytes: usize, shape_type: i32, points: &[(f64, f64)]) -> Vec<u8> {
    let mut header = vec![0u8; SHP_HEADER_LEN];
    header[0..4].copy_from_slice(&9994i32.to_be_bytes());
    header[24..28].copy_from_slice(&i32::try_from(file_len_bytes / 2).unwrap().to_be_bytes());
    header[28..32].copy_from_slice(&1000i32.to_le_bytes());
    header[32..36].copy_from_slice(&shape_type.to_le_bytes());

    let xs = points.iter().map(|p| p.0);
    let ys = points.iter().map(|p| p.1);
    let bbox = [
        xs.clone().fold(f64::INFINITY, f64::min),
        ys.clone().fold(f64::INFINITY, f64::min),
        xs.fold(f64::NEG_INFINITY, f64::max),
        ys.fold(f64::NEG_INFINITY, f64::max),
    ];
    for (i, value) in bbox.iter().enumerate() {
        let start = 36 + i * 8;
        header[start..start + 8].copy_from_slice(&value.to_le_bytes());
    }
    header
}

/// Writes a point shapefile main file and its index.
pub fn write_point_shp(dir: &Path, stem: &str, points: &[(f64, f64)]) {
    let shp_len = SHP_HEADER_LEN + POINT_RECORD_LEN * points.len();
    let mut shp = shp_header(shp_len, 1, points);
    for (i, (x, y)) in points.iter().enumerate() {
        shp.extend_from_slice(&i32::try_from(i + 1).unwrap().to_be_bytes());
        shp.extend_from_slice(&10i32.to_be_bytes());
        shp.extend_from_slice(&1i32.to_le_bytes());
        shp.extend_from_slice(&x.to_le_bytes());
        shp.extend_from_slice(&y.to_le_bytes());
    }
    std::fs::write(dir.join(format!("{stem}.shp")), shp).unwrap();

    let shx_len = SHP_HEADER_LEN + 8 * points.len();
    let mut shx = shp_header(shx_len, 1, points);
    for i in 0..points.len() {
        let offset = (SHP_HEADER_LEN + POINT_RECORD_LEN * i) / 2;
        shx.extend_from_slice(&i32::try_from(offset).unwrap().to_be_bytes());
        shx.extend_from_slice(&10i32.to_be_bytes());
    }
    std::fs::write(dir.join(format!("{stem}.shx")), shx).unwrap();
}

/// Writes a dBase III table. Values are raw bytes, padded to the column width.
pub fn write_dbf(path: &Path, columns: &[Column<'_>], rows: &[Vec<Vec<u8>>]) {
    let header_len = 32 + 32 * columns.len() + 1;
    let record_len = 1 + columns.iter().map(|c| usize::from(c.2)).sum::<usize>();

    let mut bytes = vec![0u8; 32];
    bytes[0] = 0x03;
    bytes[1] = 124;
    bytes[2] = 1;
    bytes[3] = 1;
    bytes[4..8].copy_from_slice(&u32::try_from(rows.len()).unwrap().to_le_bytes());
    bytes[8..10].copy_from_slice(&u16::try_from(header_len).unwrap().to_le_bytes());
    bytes[10..12].copy_from_slice(&u16::try_from(record_len).unwrap().to_le_bytes());

    for (name, kind, width) in columns {
        let mut descriptor = [0u8; 32];
        descriptor[..name.len()].copy_from_slice(name.as_bytes());
        descriptor[11] = *kind;
        descriptor[16] = *width;
        descriptor[17] = if *kind == b'N' { 2 } else { 0 };
        bytes.extend_from_slice(&descriptor);
    }
    bytes.push(0x0D);

    for row in rows {
        bytes.push(b' ');
        for ((_, kind, width), value) in columns.iter().zip(row) {
            let width = usize::from(*width);
            let pad = vec![b' '; width.saturating_sub(value.len())];
            if *kind == b'N' {
                bytes.extend_from_slice(&pad);
                bytes.extend_from_slice(value);
            } else {
                bytes.extend_from_slice(value);
                bytes.extend_from_slice(&pad);
            }
        }
    }
    bytes.push(0x1A);
    std::fs::write(path, bytes).unwrap();
}

/// Writes `parcels.{shp,shx,dbf}` with two named points into `dir`.
pub fn write_parcels(dir: &Path) {
    write_point_shp(dir, "parcels", &[(-3.70, 40.41), (-4.77, 37.88)]);
    write_dbf(
        &dir.join("parcels.dbf"),
        &[("NAME", b'C', 20), ("AREA", b'N', 10)],
        &[
            vec![b"Lot 1".to_vec(), b"125.50".to_vec()],
            vec![b"Lot 2".to_vec(), b"80.00".to_vec()],
        ],
    );
}

/// Writes a small little-endian TIFF stub.
pub fn write_tiff(path: &Path) {
    std::fs::write(path, b"II*\0\x08\0\0\0\0\0").unwrap();
}

/// Writes a zip archive holding `members`.
pub fn write_zip(path: &Path, members: &[(&str, Vec<u8>)]) {
    let mut writer = ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, content) in members {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

/// Zips files of `dir` by name, removing the originals.
pub fn zip_files(dir: &Path, archive: &str, names: &[&str]) -> PathBuf {
    let members: Vec<(&str, Vec<u8>)> = names
        .iter()
        .map(|name| (*name, std::fs::read(dir.join(name)).unwrap()))
        .collect();
    let path = dir.join(archive);
    write_zip(&path, &members);
    for name in names {
        std::fs::remove_file(dir.join(name)).unwrap();
    }
    path
}

/// GeoPackage geometry blob for a point: standard header, no envelope, WKB body.
pub fn gpkg_point(x: f64, y: f64) -> Vec<u8> {
    let mut blob = vec![b'G', b'P', 0x00, 0x01];
    blob.extend_from_slice(&4326i32.to_le_bytes());
    blob.push(0x01);
    blob.extend_from_slice(&1u32.to_le_bytes());
    blob.extend_from_slice(&x.to_le_bytes());
    blob.extend_from_slice(&y.to_le_bytes());
    blob
}

/// Writes a GeoPackage with one `parcels` point table holding two rows.
pub async fn write_gpkg(path: &Path) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let mut conn = SqliteConnection::connect_with(&options).await.unwrap();

    conn.execute(
        "CREATE TABLE gpkg_contents (
            table_name TEXT NOT NULL PRIMARY KEY,
            data_type TEXT NOT NULL,
            identifier TEXT,
            srs_id INTEGER
        );
        CREATE TABLE gpkg_geometry_columns (
            table_name TEXT NOT NULL,
            column_name TEXT NOT NULL,
            geometry_type_name TEXT NOT NULL,
            srs_id INTEGER NOT NULL,
            z TINYINT NOT NULL,
            m TINYINT NOT NULL
        );
        CREATE TABLE parcels (
            fid INTEGER PRIMARY KEY AUTOINCREMENT,
            geom POINT,
            name TEXT(40),
            area DOUBLE
        );
        INSERT INTO gpkg_contents VALUES ('parcels', 'features', 'parcels', 4326);
        INSERT INTO gpkg_contents VALUES ('zones', 'attributes', 'zones', 0);
        INSERT INTO gpkg_geometry_columns VALUES ('parcels', 'geom', 'POINT', 4326, 0, 0);",
    )
    .await
    .unwrap();

    for (name, area, point) in [("Lot 1", 12.5, (1.5, 2.5)), ("Lot 2", 40.0, (3.0, 4.0))] {
        sqlx::query("INSERT INTO parcels (geom, name, area) VALUES (?, ?, ?)")
            .bind(gpkg_point(point.0, point.1))
            .bind(name)
            .bind(area)
            .execute(&mut conn)
            .await
            .unwrap();
    }
    conn.close().await.unwrap();
}

/// Sorted entry names of `dir`.
pub fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
