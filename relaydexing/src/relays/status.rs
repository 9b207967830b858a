use std::str::FromStr;

use derive_more::Display;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a relay.
///
/// `Expired` is never stored; it is decided at query time from the fill
/// deadline (see [`super::RelayHashInfo::status_at`]).
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "camelCase")]
pub enum RelayStatus {
    #[display("pending")]
    Pending,
    #[display("slowFillRequested")]
    SlowFillRequested,
    #[display("filled")]
    Filled,
    #[display("expired")]
    Expired,
}

impl RelayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayStatus::Pending => "pending",
            RelayStatus::SlowFillRequested => "slowFillRequested",
            RelayStatus::Filled => "filled",
            RelayStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown relay status: {0}")]
pub struct ParseRelayStatusError(String);

impl FromStr for RelayStatus {
    type Err = ParseRelayStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(RelayStatus::Pending),
            "slowFillRequested" => Ok(RelayStatus::SlowFillRequested),
            "filled" => Ok(RelayStatus::Filled),
            "expired" => Ok(RelayStatus::Expired),
            unknown => Err(ParseRelayStatusError(unknown.to_string())),
        }
    }
}

impl ToSql<Text, Pg> for RelayStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for RelayStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Pg>>::from_sql(bytes)?;

        Ok(value.parse()?)
    }
}
