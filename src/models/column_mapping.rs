use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic payroll fields a sheet column can back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayrollField {
    Date,
    Sales,
    Refund,
    Hours,
}

impl PayrollField {
    pub const ALL: [PayrollField; 4] = [
        PayrollField::Date,
        PayrollField::Sales,
        PayrollField::Refund,
        PayrollField::Hours,
    ];

    /// Key used for persisted mappings.
    pub fn key(self) -> &'static str {
        match self {
            PayrollField::Date => "date",
            PayrollField::Sales => "sales",
            PayrollField::Refund => "refund",
            PayrollField::Hours => "hours",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        PayrollField::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn is_mandatory(self) -> bool {
        matches!(self, PayrollField::Date | PayrollField::Sales)
    }
}

impl fmt::Display for PayrollField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PayrollField::Date => "Date",
            PayrollField::Sales => "Sales",
            PayrollField::Refund => "Refund",
            PayrollField::Hours => "Hours",
        };
        f.write_str(label)
    }
}

/// Partial, user-supplied column choice (zero-based). Unset fields are inferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub date: Option<usize>,
    pub sales: Option<usize>,
    pub refund: Option<usize>,
    pub hours: Option<usize>,
}

impl ColumnSelection {
    /// Layout of the standard daily sales export: A=Date, C=Sales - Total,
    /// E=Refunds - Total, J=Hours - Worked.
    pub fn canonical() -> Self {
        ColumnSelection {
            date: Some(0),
            sales: Some(2),
            refund: Some(4),
            hours: Some(9),
        }
    }

    pub fn get(&self, field: PayrollField) -> Option<usize> {
        match field {
            PayrollField::Date => self.date,
            PayrollField::Sales => self.sales,
            PayrollField::Refund => self.refund,
            PayrollField::Hours => self.hours,
        }
    }

    pub fn set(&mut self, field: PayrollField, index: Option<usize>) {
        match field {
            PayrollField::Date => self.date = index,
            PayrollField::Sales => self.sales = index,
            PayrollField::Refund => self.refund = index,
            PayrollField::Hours => self.hours = index,
        }
    }

    pub fn is_empty(&self) -> bool {
        PayrollField::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

/// A remembered column pick and the header label it had when confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedColumn {
    pub field: PayrollField,
    pub index: usize,
    pub header_text: Option<String>,
}

/// How a column was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    Explicit,
    Learned,
    Header,
    Content,
    Default,
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MappingSource::Explicit => "selected",
            MappingSource::Learned => "remembered",
            MappingSource::Header => "header match",
            MappingSource::Content => "content match",
            MappingSource::Default => "default layout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedColumn {
    pub index: usize,
    pub source: MappingSource,
}

/// Resolved field → column correspondence. Date and sales are always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub date: ResolvedColumn,
    pub sales: ResolvedColumn,
    pub refund: Option<ResolvedColumn>,
    pub hours: Option<ResolvedColumn>,
}

impl ColumnMapping {
    /// Mapping from explicit indices, as when every column is picked by hand.
    pub fn explicit(date: usize, sales: usize, refund: Option<usize>, hours: Option<usize>) -> Self {
        let pick = |index| ResolvedColumn {
            index,
            source: MappingSource::Explicit,
        };
        ColumnMapping {
            date: pick(date),
            sales: pick(sales),
            refund: refund.map(pick),
            hours: hours.map(pick),
        }
    }

    pub fn column(&self, field: PayrollField) -> Option<ResolvedColumn> {
        match field {
            PayrollField::Date => Some(self.date),
            PayrollField::Sales => Some(self.sales),
            PayrollField::Refund => self.refund,
            PayrollField::Hours => self.hours,
        }
    }

    pub fn index(&self, field: PayrollField) -> Option<usize> {
        self.column(field).map(|c| c.index)
    }

    /// Only the columns the user picked, now or in an earlier run. Guessed
    /// columns are left unset.
    pub fn confirmed_selection(&self) -> ColumnSelection {
        let mut selection = ColumnSelection::default();
        for field in PayrollField::ALL {
            if let Some(col) = self.column(field) {
                if matches!(col.source, MappingSource::Explicit | MappingSource::Learned) {
                    selection.set(field, Some(col.index));
                }
            }
        }
        selection
    }

    /// Indices as a selection, e.g. to remember or re-apply them.
    pub fn to_selection(&self) -> ColumnSelection {
        ColumnSelection {
            date: Some(self.date.index),
            sales: Some(self.sales.index),
            refund: self.refund.map(|c| c.index),
            hours: self.hours.map(|c| c.index),
        }
    }
}
