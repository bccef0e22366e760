use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form is also the serde representation.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(
    /// CKD stages, declared mildest first so `Ord` follows severity.
    #[derive(Copy, Hash, PartialOrd, Ord)]
    CkdStage {
        Stage1 => "Stage 1",
        Stage2 => "Stage 2",
        Stage3A => "Stage 3A",
        Stage3B => "Stage 3B",
        Stage4 => "Stage 4",
        Stage5 => "Stage 5",
    }
);

impl CkdStage {
    pub const ALL: [CkdStage; 6] = [
        Self::Stage1,
        Self::Stage2,
        Self::Stage3A,
        Self::Stage3B,
        Self::Stage4,
        Self::Stage5,
    ];
}

str_enum!(
    #[derive(Copy)]
    BiologicalSex {
        Male => "M",
        Female => "F",
        Other => "other",
    }
);

str_enum!(
    /// Stable classification of a lab test definition, independent of its
    /// (localised) display name.
    #[derive(Copy, Hash)]
    TestKind {
        Creatinine => "creatinine",
        Egfr => "egfr",
        Other => "other",
    }
);

impl TestKind {
    /// Legacy name-based classification used when a definition carries no
    /// explicit kind: case-insensitive substring match.
    pub fn infer_from_name(test_name: &str) -> Self {
        let lower = test_name.to_lowercase();
        if lower.contains("créatinine") || lower.contains("creatinine") {
            Self::Creatinine
        } else if lower.contains("dfg") || lower.contains("egfr") {
            Self::Egfr
        } else {
            Self::Other
        }
    }

    /// Tests whose notifications are filed under the "dfg" severity.
    pub fn is_kidney_function(&self) -> bool {
        matches!(self, Self::Creatinine | Self::Egfr)
    }
}

str_enum!(
    #[derive(Copy)]
    AlertDirection {
        Below => "below",
        Above => "above",
    }
);

impl AlertDirection {
    /// Accepts the canonical form and the labels used by the protocol editor.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "below" | "inférieur à" | "inferieur a" | "<" => Some(Self::Below),
            "above" | "supérieur à" | "superieur a" | ">" => Some(Self::Above),
            _ => None,
        }
    }

    /// Strict comparison: a value equal to the threshold never fires.
    pub fn fires(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Below => value < threshold,
            Self::Above => value > threshold,
        }
    }
}

str_enum!(
    #[derive(Copy)]
    RequirementAction {
        Notify => "notify",
        Email => "email",
    }
);

impl RequirementAction {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "notify" | "notification" => Some(Self::Notify),
            "email" | "e-mail" => Some(Self::Email),
            _ => None,
        }
    }
}

str_enum!(
    #[derive(Copy, Hash)]
    NotificationKind {
        LabResult => "lab_result",
        StageChange => "stage_change",
        Protocol => "protocol",
    }
);

str_enum!(
    #[derive(Copy, Hash)]
    NotificationSeverity {
        Info => "info",
        Warning => "warning",
        Error => "error",
        Dfg => "dfg",
    }
);
