//! # Domain Models
//!
//! These structs represent the records managed by the portal: team members,
//! events, and media events. Each record type comes with a `Draft` payload
//! for creation and an update payload whose shape encodes the update policy
//! (members are replaced wholesale, events and media events are merged).

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::form::FormFields;
use crate::traits::{Payload, Record};

const MAX_ID_LEN: usize = 64;

/// Opaque record identifier, unique within one collection.
///
/// Generated ids are the creation time in milliseconds since the Unix epoch.
/// Stored documents may carry ids as JSON strings or integers; both load.
/// Ids end up in asset file names, so only `[A-Za-z0-9_-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawId", into = "String")]
pub struct RecordId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl RecordId {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(AppError::validation("id must not be empty"));
        }
        if raw.len() > MAX_ID_LEN {
            return Err(AppError::validation(format!(
                "id must be at most {MAX_ID_LEN} characters"
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::validation(format!(
                "id '{raw}' may only contain letters, digits, '-' and '_'"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<RawId> for RecordId {
    type Error = AppError;

    fn try_from(raw: RawId) -> Result<Self> {
        match raw {
            RawId::Text(text) => Self::parse(&text),
            RawId::Number(n) => Ok(Self(n.to_string())),
        }
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// Strict boolean parser for form and query values.
///
/// Only the exact strings `"true"` and `"false"` are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolFlag {
    True,
    False,
}

impl BoolFlag {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "true" => Ok(BoolFlag::True),
            "false" => Ok(BoolFlag::False),
            other => Err(AppError::validation(format!(
                "expected \"true\" or \"false\", got \"{other}\""
            ))),
        }
    }
}

impl FromStr for BoolFlag {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<BoolFlag> for bool {
    fn from(flag: BoolFlag) -> Self {
        matches!(flag, BoolFlag::True)
    }
}

/// An uploaded file as received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied file name; only its extension is kept.
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn require_all(fields: &[(&str, bool)]) -> Result<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    match missing.as_slice() {
        [] => Ok(()),
        [one] => Err(AppError::validation(format!("{one} is required"))),
        many => Err(AppError::validation(format!(
            "{} are required",
            many.join(", ")
        ))),
    }
}

fn filled(value: &str) -> bool {
    !value.trim().is_empty()
}

fn reject_blank(name: &str, value: &Option<String>) -> Result<()> {
    match value {
        Some(v) if !filled(v) => Err(AppError::validation(format!("{name} must not be empty"))),
        _ => Ok(()),
    }
}

/// Empty strings clear an optional field.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| filled(v))
}

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// A team member shown on the community pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: RecordId,
    pub name: String,
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    pub bio: String,
    /// Path of the member's photo (uploaded asset or shared public image)
    #[serde(default)]
    pub photo: Option<String>,
}

/// Create payload for a member. Also the update payload: a member PUT
/// replaces every scalar field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemberDraft {
    pub id: Option<RecordId>,
    pub name: String,
    pub position: String,
    pub age: Option<u32>,
    pub bio: String,
    pub photo: Option<String>,
}

impl Payload for MemberDraft {
    const UPLOAD_FIELDS: &'static [&'static str] = &["photo", "image"];

    fn validate(&self) -> Result<()> {
        require_all(&[
            ("name", filled(&self.name)),
            ("position", filled(&self.position)),
            ("bio", filled(&self.bio)),
        ])
    }

    fn from_form(mut form: FormFields) -> Result<Self> {
        let draft = Self {
            id: form.id()?,
            name: form.text("name"),
            position: form.text("position"),
            age: form.parsed("age")?,
            bio: form.text("bio"),
            photo: form.optional_text("photo"),
        };
        form.finish()?;
        Ok(draft)
    }

    fn requested_id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

impl Record for Member {
    type Draft = MemberDraft;
    type Update = MemberDraft;
    const KIND: &'static str = "member";
    const ASSET_FIELD: &'static str = "photo";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn asset(&self) -> Option<&str> {
        self.photo.as_deref()
    }

    fn set_asset(&mut self, reference: Option<String>) {
        self.photo = reference;
    }

    fn from_draft(id: RecordId, draft: MemberDraft, _now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            position: draft.position,
            age: draft.age,
            bio: draft.bio,
            photo: non_empty(draft.photo),
        }
    }

    /// Wholesale replacement. The photo reference survives unless the
    /// payload names a new one.
    fn apply(&mut self, update: MemberDraft, _now: DateTime<Utc>) {
        self.name = update.name;
        self.position = update.position;
        self.age = update.age;
        self.bio = update.bio;
        if let Some(photo) = update.photo {
            self.photo = non_empty(Some(photo));
        }
    }

    fn seed() -> Vec<Self> {
        let seed = |id: &str, name: &str, position: &str, age: u32, photo: &str, bio: &str| Member {
            id: RecordId(id.to_string()),
            name: name.to_string(),
            position: position.to_string(),
            age: Some(age),
            bio: bio.to_string(),
            photo: Some(photo.to_string()),
        };
        vec![
            seed(
                "1",
                "Priya Yadav",
                "Director",
                35,
                "/owner.png",
                "Priya is the visionary leader of our foundation with over 10 years of experience in community development and philanthropy.",
            ),
            seed(
                "2",
                "Rahul Sharma",
                "Program Manager",
                32,
                "/team-member1.jpg",
                "Rahul oversees our education initiatives and has successfully implemented numerous programs for underprivileged children.",
            ),
            seed(
                "3",
                "Ananya Patel",
                "Community Outreach",
                28,
                "/team-member2.jpg",
                "Ananya builds relationships with local communities and ensures our programs address their specific needs.",
            ),
        ]
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

fn default_active() -> bool {
    true
}

/// A completed or upcoming event listed on the events pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub location: Option<String>,
    /// Short label rendered over the event card (e.g. "Upcoming")
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventDraft {
    pub id: Option<RecordId>,
    pub title: String,
    pub description: String,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub badge: Option<String>,
    pub is_active: Option<bool>,
    pub image: Option<String>,
}

impl Payload for EventDraft {
    fn validate(&self) -> Result<()> {
        require_all(&[
            ("title", filled(&self.title)),
            ("description", filled(&self.description)),
            ("date", self.date.is_some()),
        ])
    }

    fn from_form(mut form: FormFields) -> Result<Self> {
        let draft = Self {
            id: form.id()?,
            title: form.text("title"),
            description: form.text("description"),
            date: form.parsed("date")?,
            location: form.optional_text("location"),
            badge: form.optional_text("badge"),
            is_active: form.flag("is_active")?,
            image: form.optional_text("image"),
        };
        form.finish()?;
        Ok(draft)
    }

    fn requested_id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

/// Partial update for an event; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventPatch {
    pub id: Option<RecordId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub badge: Option<String>,
    pub is_active: Option<bool>,
    pub image: Option<String>,
}

impl Payload for EventPatch {
    fn validate(&self) -> Result<()> {
        reject_blank("title", &self.title)?;
        reject_blank("description", &self.description)
    }

    fn from_form(mut form: FormFields) -> Result<Self> {
        let patch = Self {
            id: form.id()?,
            title: form.optional_text("title"),
            description: form.optional_text("description"),
            date: form.parsed("date")?,
            location: form.optional_text("location"),
            badge: form.optional_text("badge"),
            is_active: form.flag("is_active")?,
            image: form.optional_text("image"),
        };
        form.finish()?;
        Ok(patch)
    }

    fn requested_id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

impl Record for Event {
    type Draft = EventDraft;
    type Update = EventPatch;
    const KIND: &'static str = "event";
    const ASSET_FIELD: &'static str = "image";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn asset(&self) -> Option<&str> {
        self.image.as_deref()
    }

    fn set_asset(&mut self, reference: Option<String>) {
        self.image = reference;
    }

    fn from_draft(id: RecordId, draft: EventDraft, _now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            // validate() runs before construction; the epoch default is unreachable
            date: draft.date.unwrap_or_default(),
            location: non_empty(draft.location),
            badge: non_empty(draft.badge),
            is_active: draft.is_active.unwrap_or(true),
            image: non_empty(draft.image),
        }
    }

    fn apply(&mut self, patch: EventPatch, _now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(location) = patch.location {
            self.location = non_empty(Some(location));
        }
        if let Some(badge) = patch.badge {
            self.badge = non_empty(Some(badge));
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        if let Some(image) = patch.image {
            self.image = non_empty(Some(image));
        }
    }
}

// ---------------------------------------------------------------------------
// MediaEvent
// ---------------------------------------------------------------------------

/// An entry in the media gallery. Timestamps are maintained by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEvent {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaEventDraft {
    pub id: Option<RecordId>,
    pub title: String,
    pub description: String,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub image: Option<String>,
}

impl Payload for MediaEventDraft {
    fn validate(&self) -> Result<()> {
        require_all(&[
            ("title", filled(&self.title)),
            ("description", filled(&self.description)),
            ("date", self.date.is_some()),
        ])
    }

    fn from_form(mut form: FormFields) -> Result<Self> {
        let draft = Self {
            id: form.id()?,
            title: form.text("title"),
            description: form.text("description"),
            date: form.parsed("date")?,
            location: form.optional_text("location"),
            image: form.optional_text("image"),
        };
        form.finish()?;
        Ok(draft)
    }

    fn requested_id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaEventPatch {
    pub id: Option<RecordId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub image: Option<String>,
}

impl Payload for MediaEventPatch {
    fn validate(&self) -> Result<()> {
        reject_blank("title", &self.title)?;
        reject_blank("description", &self.description)
    }

    fn from_form(mut form: FormFields) -> Result<Self> {
        let patch = Self {
            id: form.id()?,
            title: form.optional_text("title"),
            description: form.optional_text("description"),
            date: form.parsed("date")?,
            location: form.optional_text("location"),
            image: form.optional_text("image"),
        };
        form.finish()?;
        Ok(patch)
    }

    fn requested_id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

impl Record for MediaEvent {
    type Draft = MediaEventDraft;
    type Update = MediaEventPatch;
    const KIND: &'static str = "media event";
    const ASSET_FIELD: &'static str = "image";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn asset(&self) -> Option<&str> {
        self.image.as_deref()
    }

    fn set_asset(&mut self, reference: Option<String>) {
        self.image = reference;
    }

    fn from_draft(id: RecordId, draft: MediaEventDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            date: draft.date.unwrap_or_default(),
            location: non_empty(draft.location),
            image: non_empty(draft.image),
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, patch: MediaEventPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(location) = patch.location {
            self.location = non_empty(Some(location));
        }
        if let Some(image) = patch.image {
            self.image = non_empty(Some(image));
        }
        self.updated_at = now;
    }
}
