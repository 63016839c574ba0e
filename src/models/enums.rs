/// Returned when a string does not name any variant of a `str_enum!` type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field} value: '{value}'")]
pub struct UnknownVariant {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
///
/// Serde uses the same string form, so the wire name, the display name and
/// the parse input never drift apart.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
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
            type Err = $crate::models::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err($crate::models::UnknownVariant {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

pub(crate) use str_enum;

str_enum!(
    /// One named step of the document pipeline. Declaration order is the
    /// fixed pipeline order.
    StageId {
        Ocr => "ocr",
        Preprocess => "preprocess",
        Requirements => "requirements",
        BuildQuery => "build-query",
        Response => "response",
    }
);

impl StageId {
    /// All stages in pipeline order.
    pub const ALL: [StageId; 5] = [
        StageId::Ocr,
        StageId::Preprocess,
        StageId::Requirements,
        StageId::BuildQuery,
        StageId::Response,
    ];
}

str_enum!(
    /// Status persisted per stage.
    StageStatus {
        Waiting => "waiting",
        Processing => "processing",
        Complete => "complete",
        Error => "error",
    }
);

str_enum!(
    /// Status shown to the user. `Blocked` is never stored; it is computed
    /// from prerequisites at read time.
    DisplayStatus {
        Waiting => "waiting",
        Processing => "processing",
        Complete => "complete",
        Error => "error",
        Blocked => "blocked",
    }
);

impl From<StageStatus> for DisplayStatus {
    fn from(status: StageStatus) -> Self {
        match status {
            StageStatus::Waiting => Self::Waiting,
            StageStatus::Processing => Self::Processing,
            StageStatus::Complete => Self::Complete,
            StageStatus::Error => Self::Error,
        }
    }
}

str_enum!(
    /// Human gates that unblock dependent stages.
    Confirmation {
        Preprocess => "preprocessConfirmed",
        BuildQuery => "buildQueryConfirmed",
    }
);
