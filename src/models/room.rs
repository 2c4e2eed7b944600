use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub building_id: i64,
    pub name: String,
    pub capacity: i32,
    pub status: RoomStatus,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Available,
    Maintenance,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "maintenance" => RoomStatus::Maintenance,
            _ => RoomStatus::Available,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub contacts: Vec<Contact>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Parse the stored contacts blob into typed records.
///
/// Malformed JSON is an error, not an empty list: a building row with a
/// corrupt contacts column should surface during the read that hits it
/// rather than render as a blank field downstream.
pub fn parse_contacts(raw: Option<&str>) -> anyhow::Result<Vec<Contact>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let contacts: Vec<Contact> = serde_json::from_str(trimmed)
        .map_err(|e| anyhow::anyhow!("malformed contacts JSON: {e}"))?;

    for contact in &contacts {
        if contact.name.trim().is_empty() {
            return Err(anyhow::anyhow!("contact entry missing a name"));
        }
    }
    Ok(contacts)
}
