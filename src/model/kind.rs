//! Operation kinds and the HTTP binding each one implies.

use axum::http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    FindOne,
    FindMany,
    UpsertOne,
    UpsertMany,
    UpdateOne,
    UpdateMany,
    PatchOne,
    PatchMany,
    DeleteOne,
    DeleteMany,
    PostRedirectGet,
}

/// What a kind's request body looks like.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    None,
    /// Insert semantics: required/optional per column, defaults applied when omitted.
    Insert,
    /// JSON array of insert objects.
    InsertMany,
    /// Every field optional; only supplied fields are written.
    Patch,
    /// Full replace: omitted optional fields reset to default or null.
    Update,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    SingleRow,
    ListOfRows,
    /// Redirect metadata only.
    Empty,
}

impl OperationKind {
    pub const ALL: [OperationKind; 11] = [
        OperationKind::FindOne,
        OperationKind::FindMany,
        OperationKind::UpsertOne,
        OperationKind::UpsertMany,
        OperationKind::UpdateOne,
        OperationKind::UpdateMany,
        OperationKind::PatchOne,
        OperationKind::PatchMany,
        OperationKind::DeleteOne,
        OperationKind::DeleteMany,
        OperationKind::PostRedirectGet,
    ];

    /// Kinds that can share one prefix: every kind except the two extra POST
    /// bindings, which need their own prefix.
    pub const FULL_CRUD: [OperationKind; 9] = [
        OperationKind::FindOne,
        OperationKind::FindMany,
        OperationKind::UpsertOne,
        OperationKind::UpdateOne,
        OperationKind::UpdateMany,
        OperationKind::PatchOne,
        OperationKind::PatchMany,
        OperationKind::DeleteOne,
        OperationKind::DeleteMany,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::FindOne => "find_one",
            OperationKind::FindMany => "find_many",
            OperationKind::UpsertOne => "upsert_one",
            OperationKind::UpsertMany => "upsert_many",
            OperationKind::UpdateOne => "update_one",
            OperationKind::UpdateMany => "update_many",
            OperationKind::PatchOne => "patch_one",
            OperationKind::PatchMany => "patch_many",
            OperationKind::DeleteOne => "delete_one",
            OperationKind::DeleteMany => "delete_many",
            OperationKind::PostRedirectGet => "post_redirect_get",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            OperationKind::FindOne | OperationKind::FindMany => Method::GET,
            OperationKind::UpsertOne | OperationKind::UpsertMany | OperationKind::PostRedirectGet => {
                Method::POST
            }
            OperationKind::UpdateOne | OperationKind::UpdateMany => Method::PUT,
            OperationKind::PatchOne | OperationKind::PatchMany => Method::PATCH,
            OperationKind::DeleteOne | OperationKind::DeleteMany => Method::DELETE,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OperationKind::UpsertOne | OperationKind::UpsertMany => StatusCode::CREATED,
            OperationKind::PostRedirectGet => StatusCode::SEE_OTHER,
            _ => StatusCode::OK,
        }
    }

    /// Addressed by primary key in the path.
    pub fn takes_path(&self) -> bool {
        matches!(
            self,
            OperationKind::FindOne | OperationKind::DeleteOne | OperationKind::PatchOne | OperationKind::UpdateOne
        )
    }

    /// Accepts `limit`, `offset`, `order_by` and `direction`.
    pub fn takes_pagination(&self) -> bool {
        matches!(
            self,
            OperationKind::FindMany | OperationKind::DeleteMany | OperationKind::PatchMany | OperationKind::UpdateMany
        )
    }

    /// Accepts per-column filter fields in the query string.
    pub fn takes_filters(&self) -> bool {
        self.takes_path() || self.takes_pagination()
    }

    pub fn body_kind(&self) -> BodyKind {
        match self {
            OperationKind::UpsertOne | OperationKind::PostRedirectGet => BodyKind::Insert,
            OperationKind::UpsertMany => BodyKind::InsertMany,
            OperationKind::PatchOne | OperationKind::PatchMany => BodyKind::Patch,
            OperationKind::UpdateOne | OperationKind::UpdateMany => BodyKind::Update,
            _ => BodyKind::None,
        }
    }

    pub fn response_kind(&self) -> ResponseKind {
        match self {
            OperationKind::FindOne
            | OperationKind::UpsertOne
            | OperationKind::PatchOne
            | OperationKind::UpdateOne
            | OperationKind::DeleteOne => ResponseKind::SingleRow,
            OperationKind::FindMany
            | OperationKind::UpsertMany
            | OperationKind::PatchMany
            | OperationKind::UpdateMany
            | OperationKind::DeleteMany => ResponseKind::ListOfRows,
            OperationKind::PostRedirectGet => ResponseKind::Empty,
        }
    }

    pub fn is_upsert(&self) -> bool {
        matches!(self, OperationKind::UpsertOne | OperationKind::UpsertMany)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_and_statuses() {
        let table: Vec<(OperationKind, Method, u16)> = OperationKind::ALL
            .iter()
            .map(|k| (*k, k.method(), k.status().as_u16()))
            .collect();
        assert!(table.contains(&(OperationKind::FindOne, Method::GET, 200)));
        assert!(table.contains(&(OperationKind::UpsertMany, Method::POST, 201)));
        assert!(table.contains(&(OperationKind::PostRedirectGet, Method::POST, 303)));
        assert!(table.contains(&(OperationKind::PatchMany, Method::PATCH, 200)));
        assert!(table.contains(&(OperationKind::UpdateOne, Method::PUT, 200)));
        assert!(table.contains(&(OperationKind::DeleteMany, Method::DELETE, 200)));
    }

    #[test]
    fn serde_names_match_as_str() {
        for k in OperationKind::ALL {
            assert_eq!(serde_json::to_value(k).unwrap(), serde_json::json!(k.as_str()));
        }
    }
}
