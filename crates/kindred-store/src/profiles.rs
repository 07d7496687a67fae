//! Profile lookups backing [`Participant`] projections.

use rusqlite::params;

use kindred_shared::types::UserId;

use crate::database::{decode_uuid, not_found, Database};
use crate::error::Result;
use crate::models::Participant;

impl Database {
    /// Insert a profile, or refresh its name and avatar if it already exists.
    pub fn upsert_profile(&self, profile: &Participant) -> Result<()> {
        self.conn().execute(
            "INSERT INTO profiles (id, name, avatar_url)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, avatar_url = excluded.avatar_url",
            params![profile.id.to_string(), profile.name, profile.avatar_url],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, id: UserId) -> Result<Participant> {
        self.conn()
            .query_row(
                "SELECT id, name, avatar_url FROM profiles WHERE id = ?1",
                params![id.to_string()],
                row_to_participant,
            )
            .map_err(not_found)
    }
}

/// Map a `(id, name, avatar_url)` row to a [`Participant`].
pub(crate) fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let avatar_url: Option<String> = row.get(2)?;

    Ok(Participant {
        id: UserId(decode_uuid(0, &id_str)?),
        name,
        avatar_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::open_temp;
    use crate::error::StoreError;

    #[test]
    fn upsert_then_update() {
        let (db, _dir) = open_temp();
        let id = UserId::new();
        db.upsert_profile(&Participant {
            id,
            name: "Ada".into(),
            avatar_url: None,
        })
        .unwrap();
        db.upsert_profile(&Participant {
            id,
            name: "Ada L.".into(),
            avatar_url: Some("https://cdn.example/ada.png".into()),
        })
        .unwrap();

        let profile = db.get_profile(id).unwrap();
        assert_eq!(profile.name, "Ada L.");
        assert_eq!(profile.avatar_url.as_deref(), Some("https://cdn.example/ada.png"));
    }

    #[test]
    fn missing_profile_is_not_found() {
        let (db, _dir) = open_temp();
        assert!(matches!(db.get_profile(UserId::new()), Err(StoreError::NotFound)));
    }
}
