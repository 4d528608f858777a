use anyhow::{bail, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::db::{cities, countries, list_places, lists, users, ListFilter, PlaceInList, Query};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("unknown export format '{}' (expected json or csv)", other),
        }
    }
}

/// A list with its context and ordered places
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedList {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub subgenre: Option<String>,
    pub city: String,
    pub country: String,
    pub creator: String,
    pub like_count: i64,
    pub place_count: i64,
    pub average_rating: f64,
    pub rating_count: i64,
    pub created_at: String,
    pub places: Vec<ExportedPlace>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedPlace {
    pub order: i64,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub google_place_id: String,
    pub note: Option<String>,
    pub price_range: Option<String>,
}

impl From<PlaceInList> for ExportedPlace {
    fn from(item: PlaceInList) -> Self {
        Self {
            order: item.entry.order,
            name: item.place.name,
            address: item.place.address,
            lat: item.place.lat,
            lng: item.place.lng,
            google_place_id: item.place.google_place_id,
            note: item.entry.note,
            price_range: item.entry.price_range,
        }
    }
}

/// Export every list to a file. Returns the number of lists written.
pub fn export_lists(conn: &Connection, output_path: &Path, format: ExportFormat) -> Result<usize> {
    let lists = get_lists_for_export(conn)?;
    let count = lists.len();

    match format {
        ExportFormat::Json => export_json(&lists, output_path)?,
        ExportFormat::Csv => export_csv(&lists, output_path)?,
    }

    tracing::info!("Exported {} list(s) as {} to {:?}", count, format.name(), output_path);
    Ok(count)
}

fn get_lists_for_export(conn: &Connection) -> Result<Vec<ExportedList>> {
    // Small lookup tables; every city and country is loaded once.
    let countries: HashMap<String, String> = countries::find_many(conn, &Default::default(), &Query::all())?
        .into_iter()
        .map(|c| (c.id, c.code.unwrap_or(c.name)))
        .collect();
    let cities: HashMap<String, (String, String)> = cities::find_many(conn, &Default::default(), &Query::all())?
        .into_iter()
        .map(|c| {
            let country = countries.get(&c.country_id).cloned().unwrap_or_default();
            (c.id, (c.name, country))
        })
        .collect();

    let mut creators: HashMap<String, String> = HashMap::new();
    let mut exported = Vec::new();
    for list in lists::find_many(conn, &ListFilter::default(), &Query::all())? {
        let creator = match creators.get(&list.creator_id) {
            Some(name) => name.clone(),
            None => {
                let name = users::get(conn, &list.creator_id)?.name;
                creators.insert(list.creator_id.clone(), name.clone());
                name
            }
        };
        let (city, country) = cities.get(&list.city_id).cloned().unwrap_or_default();
        let places = list_places::places_in_list(conn, &list.id)?
            .into_iter()
            .map(ExportedPlace::from)
            .collect();

        exported.push(ExportedList {
            id: list.id,
            name: list.name,
            description: list.description,
            genre: list.genre,
            subgenre: list.subgenre,
            city,
            country,
            creator,
            like_count: list.like_count,
            place_count: list.place_count,
            average_rating: list.average_rating,
            rating_count: list.rating_count,
            created_at: list.created_at.to_rfc3339(),
            places,
        });
    }

    Ok(exported)
}

fn export_json(lists: &[ExportedList], output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(lists)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// One row per list entry; a list without places gets a single row with
/// empty place columns.
fn export_csv(lists: &[ExportedList], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "list_id",
        "list_name",
        "genre",
        "city",
        "country",
        "creator",
        "like_count",
        "place_count",
        "average_rating",
        "order",
        "place_name",
        "address",
        "lat",
        "lng",
        "google_place_id",
        "note",
        "price_range",
    ])?;

    for list in lists {
        let list_columns = [
            list.id.clone(),
            list.name.clone(),
            list.genre.clone().unwrap_or_default(),
            list.city.clone(),
            list.country.clone(),
            list.creator.clone(),
            list.like_count.to_string(),
            list.place_count.to_string(),
            list.average_rating.to_string(),
        ];

        if list.places.is_empty() {
            let mut record = list_columns.to_vec();
            record.extend(std::iter::repeat(String::new()).take(8));
            wtr.write_record(&record)?;
            continue;
        }

        for place in &list.places {
            let mut record = list_columns.to_vec();
            record.extend([
                place.order.to_string(),
                place.name.clone(),
                place.address.clone(),
                place.lat.to_string(),
                place.lng.to_string(),
                place.google_place_id.clone(),
                place.note.clone().unwrap_or_default(),
                place.price_range.clone().unwrap_or_default(),
            ]);
            wtr.write_record(&record)?;
        }
    }

    wtr.flush()?;
    Ok(())
}
