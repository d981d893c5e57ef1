use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::DbId;

pub const DEFAULT_INVITATION_KIND: &str = "basic";

/// Event invitation aggregate.
///
/// An invitation always owns at least one detail block describing the hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Option<DbId>,
    pub invitation_key: String,
    pub image: Option<String>,
    pub user_id: DbId,
    pub category_id: DbId,
    pub template: String,
    pub kind: String,
    pub is_confirmed: bool,
    pub is_participant: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub address: Option<String>,
    pub location: Option<String>,
    pub link: Option<String>,
    pub telephone: Option<String>,
    pub note: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub updated_by: Option<DbId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Vec<InvitationDetail>,
}

/// Host information printed on an invitation (couple, parents or a single person).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationDetail {
    pub id: Option<DbId>,
    pub title: String,
    pub bride_name: String,
    pub bride_surname: String,
    pub bride_mother_name: String,
    pub bride_mother_surname: String,
    pub bride_father_name: String,
    pub bride_father_surname: String,
    pub groom_name: String,
    pub groom_surname: String,
    pub groom_mother_name: String,
    pub groom_mother_surname: String,
    pub groom_father_name: String,
    pub groom_father_surname: String,
    pub person: String,
    pub mother_name: String,
    pub mother_surname: String,
    pub father_name: String,
    pub father_surname: String,
    pub is_mother_live: bool,
    pub is_father_live: bool,
    pub is_bride_mother_live: bool,
    pub is_bride_father_live: bool,
    pub is_groom_mother_live: bool,
    pub is_groom_father_live: bool,
}

/// Request DTO for creating or updating an invitation
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct InvitationRequest {
    #[validate(range(min = 1, message = "Category is required"))]
    pub category_id: DbId,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub title: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub template: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub time: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    #[validate(url(message = "Location must be a valid URL"))]
    pub location: Option<String>,
    #[serde(default)]
    #[validate(url(message = "Link must be a valid URL"))]
    pub link: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub telephone: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub is_confirmed: bool,
    #[serde(default)]
    pub is_participant: bool,
    #[validate(nested)]
    pub detail: InvitationDetailRequest,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct InvitationDetailRequest {
    #[serde(default)]
    #[validate(length(max = 255))]
    pub title: String,
    #[serde(default)]
    pub bride_name: String,
    #[serde(default)]
    pub bride_surname: String,
    #[serde(default)]
    pub bride_mother_name: String,
    #[serde(default)]
    pub bride_mother_surname: String,
    #[serde(default)]
    pub bride_father_name: String,
    #[serde(default)]
    pub bride_father_surname: String,
    #[serde(default)]
    pub groom_name: String,
    #[serde(default)]
    pub groom_surname: String,
    #[serde(default)]
    pub groom_mother_name: String,
    #[serde(default)]
    pub groom_mother_surname: String,
    #[serde(default)]
    pub groom_father_name: String,
    #[serde(default)]
    pub groom_father_surname: String,
    #[serde(default)]
    pub person: String,
    #[serde(default)]
    pub mother_name: String,
    #[serde(default)]
    pub mother_surname: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub father_surname: String,
    #[serde(default)]
    pub is_mother_live: bool,
    #[serde(default)]
    pub is_father_live: bool,
    #[serde(default)]
    pub is_bride_mother_live: bool,
    #[serde(default)]
    pub is_bride_father_live: bool,
    #[serde(default)]
    pub is_groom_mother_live: bool,
    #[serde(default)]
    pub is_groom_father_live: bool,
}

fn blank_to_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl InvitationDetail {
    /// Detail row for `req`, reusing `id` when the invitation already has a detail block.
    pub fn from_request(id: Option<DbId>, req: InvitationDetailRequest) -> Self {
        InvitationDetail {
            id,
            title: req.title,
            bride_name: req.bride_name,
            bride_surname: req.bride_surname,
            bride_mother_name: req.bride_mother_name,
            bride_mother_surname: req.bride_mother_surname,
            bride_father_name: req.bride_father_name,
            bride_father_surname: req.bride_father_surname,
            groom_name: req.groom_name,
            groom_surname: req.groom_surname,
            groom_mother_name: req.groom_mother_name,
            groom_mother_surname: req.groom_mother_surname,
            groom_father_name: req.groom_father_name,
            groom_father_surname: req.groom_father_surname,
            person: req.person,
            mother_name: req.mother_name,
            mother_surname: req.mother_surname,
            father_name: req.father_name,
            father_surname: req.father_surname,
            is_mother_live: req.is_mother_live,
            is_father_live: req.is_father_live,
            is_bride_mother_live: req.is_bride_mother_live,
            is_bride_father_live: req.is_bride_father_live,
            is_groom_mother_live: req.is_groom_mother_live,
            is_groom_father_live: req.is_groom_father_live,
        }
    }
}

impl Invitation {
    /// Build an unpersisted invitation identified by `invitation_key`.
    pub fn from_request(user_id: DbId, invitation_key: String, req: InvitationRequest) -> Self {
        let mut invitation = Invitation {
            id: None,
            invitation_key,
            image: None,
            user_id,
            category_id: 0,
            template: String::new(),
            kind: DEFAULT_INVITATION_KIND.to_string(),
            is_confirmed: false,
            is_participant: true,
            title: None,
            description: None,
            venue: None,
            address: None,
            location: None,
            link: None,
            telephone: None,
            note: None,
            date: None,
            time: None,
            updated_by: None,
            created_at: None,
            updated_at: None,
            details: Vec::new(),
        };
        invitation.apply_request(req);
        invitation
    }

    /// Copy request scalars onto the invitation and reconcile the single detail block
    /// against the one already owned (its id is reused).
    pub fn apply_request(&mut self, req: InvitationRequest) {
        self.category_id = req.category_id;
        self.title = blank_to_none(&req.title);
        self.template = req.template.trim().to_string();
        self.kind = blank_to_none(&req.kind).unwrap_or_else(|| DEFAULT_INVITATION_KIND.to_string());
        self.description = blank_to_none(&req.description);
        self.date = req.date;
        self.time = blank_to_none(&req.time);
        self.venue = blank_to_none(&req.venue);
        self.address = blank_to_none(&req.address);
        self.location = req.location.as_deref().and_then(blank_to_none);
        self.link = req.link.as_deref().and_then(blank_to_none);
        self.telephone = blank_to_none(&req.telephone);
        self.note = blank_to_none(&req.note);
        self.is_confirmed = req.is_confirmed;
        self.is_participant = req.is_participant;

        let existing_id = self.details.first().and_then(|detail| detail.id);
        self.details = vec![InvitationDetail::from_request(existing_id, req.detail)];
    }
}
