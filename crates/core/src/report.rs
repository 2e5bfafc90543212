//! CSV export of validated elements for manual review.
//!
//! One row per valid element, with enough context (name, coordinates,
//! elevation, a direct OSM link) to spot-check results before an upload run.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::element::{Element, ElementType, ELE_SOURCE_TAG, ELE_TAG};
use crate::validate::ValidatedData;
use crate::Result;

const HEADER: [&str; 11] = [
    "category",
    "type",
    "id",
    "name",
    "lat",
    "lon",
    "elevation",
    "elevation_source",
    "tourism",
    "railway",
    "osm_link",
];

/// Write all valid elements to a CSV file, returning the row count.
pub fn export_csv(data: &ValidatedData, path: &Path) -> Result<usize> {
    let categories = [
        ("train_stations", &data.train_stations.valid_elements),
        ("alpine_huts", &data.alpine_huts.valid_elements),
        ("other_accommodations", &data.other_accommodations.valid_elements),
    ];

    let total: usize = categories.iter().map(|(_, elements)| elements.len()).sum();
    if total == 0 {
        log::warn!("No data to export");
        return Ok(0);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);

    write_row(&mut writer, HEADER.iter().copied())?;
    for (category, elements) in categories {
        for element in elements {
            let row = element_row(element, category);
            write_row(&mut writer, row.iter().map(String::as_str))?;
        }
    }
    writer.flush()?;

    log::info!("Exported {} elements to {}", total, path.display());
    Ok(total)
}

fn element_row(element: &Element, category: &str) -> [String; 11] {
    let (lat, lon) = match element.element_type {
        ElementType::Node => (element.lat, element.lon),
        ElementType::Way => element
            .center
            .map_or((0.0, 0.0), |center| (center.lat, center.lon)),
    };

    let tag = |key: &str| element.tag(key).unwrap_or_default().to_string();

    [
        category.to_string(),
        element.element_type.to_string(),
        element.id.to_string(),
        element.name().unwrap_or_default().to_string(),
        format!("{lat:.6}"),
        format!("{lon:.6}"),
        tag(ELE_TAG),
        tag(ELE_SOURCE_TAG),
        tag("tourism"),
        tag("railway"),
        element.osm_link(),
    ]
}

fn write_row<'a, W: Write>(writer: &mut W, fields: impl Iterator<Item = &'a str>) -> Result<()> {
    let line = fields.map(csv_escape).collect::<Vec<_>>().join(",");
    writeln!(writer, "{line}")?;
    Ok(())
}

/// Quote a field if it contains a delimiter, quote, or newline.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::tagged_node;
    use crate::validate::ValidatedCategory;

    fn validated_with(elements: Vec<Element>) -> ValidatedData {
        ValidatedData {
            train_stations: ValidatedCategory {
                valid_count: elements.len(),
                invalid_count: 0,
                valid_elements: elements,
            },
            ..Default::default()
        }
    }

    fn station(id: i64, name: &str) -> Element {
        let mut e = tagged_node(id, 44.4268, 26.1025, "railway", "station");
        e.tags.insert("name".into(), name.into());
        e.tags.insert(ELE_TAG.into(), "81.5".into());
        e.tags.insert(ELE_SOURCE_TAG.into(), "SRTM".into());
        e
    }

    #[test]
    fn test_export_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elevation_data.csv");

        let count = export_csv(&validated_with(vec![station(1, "Gara de Nord")]), &path).unwrap();
        assert_eq!(count, 1);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], HEADER.join(","));
        assert!(lines[1].starts_with("train_stations,node,1,Gara de Nord,44.426800,26.102500,81.5,SRTM"));
        assert!(lines[1].ends_with("https://www.openstreetmap.org/node/1"));
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        export_csv(&validated_with(vec![station(1, "Halta, Veche")]), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"Halta, Veche\""));
    }

    #[test]
    fn test_empty_export_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let count = export_csv(&ValidatedData::default(), &path).unwrap();
        assert_eq!(count, 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
