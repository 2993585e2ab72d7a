use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

pub type PlayerId = String;

/// Number of shared events per comrade id.
pub type ComradeCount = HashMap<PlayerId, u32>;

/// One team's participation in one event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct EventParticipation {
    #[serde(rename = "idtournament")]
    pub event_id: String,
    #[serde(rename = "idteam")]
    pub team_id: String,
}

impl EventParticipation {
    pub fn new<E, T>(event_id: E, team_id: T) -> Self
    where
        E: Into<String>,
        T: Into<String>,
    {
        EventParticipation {
            event_id: event_id.into(),
            team_id: team_id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlayerProfile {
    #[serde(rename = "idplayer")]
    pub id: PlayerId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub surname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub patronymic: String,
    // Not part of upstream data, filled in from the aggregated counts.
    #[serde(rename = "games", default)]
    pub shared_count: u32,
}

impl PlayerProfile {
    pub fn new<I, N, S, P>(id: I, name: N, surname: S, patronymic: P) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        S: Into<String>,
        P: Into<String>,
    {
        PlayerProfile {
            id: id.into(),
            name: name.into(),
            surname: surname.into(),
            patronymic: patronymic.into(),
            shared_count: 0,
        }
    }

    pub fn with_shared_count(mut self, shared_count: u32) -> Self {
        self.shared_count = shared_count;
        self
    }
}

/// Decodes an explicit `null` the same way as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
