//! Opaque record identifiers.
//!
//! The storage adapters disagree on key representation: the relational
//! variants hand out serial integers while the document variant uses 24-char
//! hex object ids. The domain only ever sees the string form; each adapter
//! parses it back into its native key type and reports unparseable ids as
//! query errors.

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
            utoipa::ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a store-assigned identifier.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Identifier in its canonical string form.
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.0.as_str())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }
    };
}

record_id! {
    /// Identifier of a registered account.
    UserId
}

record_id! {
    /// Identifier of a deduplicated physical address.
    LocationId
}

record_id! {
    /// Identifier of a listing.
    ApartmentId
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;

    #[test]
    fn ids_round_trip_their_string_form() {
        let id = UserId::new("42");
        assert_eq!(id.as_str(), "42");
        assert_eq!(id.to_string(), "42");
        assert_eq!(UserId::from("42"), id);
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = ApartmentId::new("65f1c0ffee");
        let json = serde_json::to_string(&id).expect("serializable");
        assert_eq!(json, "\"65f1c0ffee\"");
    }
}
