use std::cmp::Ordering;

use enum_cycling::EnumCycle;
use serde::{Deserialize, Serialize};

use super::Record;

/// Field the record list is sorted by
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, EnumCycle, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SortField {
    #[default]
    Name,
    #[strum(serialize = "az")]
    #[serde(rename = "az")]
    Zone,
    Type,
    LaunchTime,
    State,
    Id,
}

impl SortField {
    /// Compares two records on this field, ascending.
    ///
    /// Ties are broken by display name and then by identifier, so the order is total.
    pub fn compare(self, a: &Record, b: &Record) -> Ordering {
        let primary = match self {
            SortField::Name => Ordering::Equal,
            SortField::Zone => a.zones().first().cmp(&b.zones().first()),
            SortField::Type => a.instance_types().first().cmp(&b.instance_types().first()),
            SortField::LaunchTime => a.created_at().cmp(&b.created_at()),
            SortField::State => a.status().cmp(b.status()),
            SortField::Id => a.identifier().cmp(b.identifier()),
        };
        primary
            .then_with(|| a.display_name().cmp(b.display_name()))
            .then_with(|| a.identifier().cmp(b.identifier()))
    }
}

/// Direction of the sort
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Returns the opposite direction
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    /// An arrow glyph for the status line
    pub fn arrow(self) -> &'static str {
        match self {
            SortDirection::Asc => "↑",
            SortDirection::Desc => "↓",
        }
    }

    /// Applies the direction to an ascending ordering
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{RecordMeta, VmRecord};

    fn vm(id: &str, name: &str, zone: &str, day: u32) -> Record {
        Record::Vm(VmRecord {
            meta: RecordMeta {
                id: id.to_owned(),
                name: name.to_owned(),
                created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).single(),
                ..Default::default()
            },
            availability_zone: zone.to_owned(),
            ..Default::default()
        })
    }

    #[test]
    fn test_compare_fields() {
        let a = vm("i-2", "alpha", "eu-1b", 2);
        let b = vm("i-1", "beta", "eu-1a", 1);

        assert_eq!(SortField::Name.compare(&a, &b), Ordering::Less);
        assert_eq!(SortField::Zone.compare(&a, &b), Ordering::Greater);
        assert_eq!(SortField::LaunchTime.compare(&a, &b), Ordering::Greater);
        assert_eq!(SortField::Id.compare(&a, &b), Ordering::Greater);
        assert_eq!(SortDirection::Desc.apply(SortField::Name.compare(&a, &b)), Ordering::Greater);
    }

    #[test]
    fn test_ties_are_broken_by_name() {
        let a = vm("i-1", "alpha", "eu-1a", 1);
        let b = vm("i-2", "beta", "eu-1a", 1);
        assert_eq!(SortField::Zone.compare(&a, &b), Ordering::Less);
        assert_eq!(SortField::Name.down(), SortField::Zone);
    }
}
