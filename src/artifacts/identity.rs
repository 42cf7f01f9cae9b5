//! Package identity from artifact file names
//!
//! `dotnet pack` names its output `<PackageId>.<Version>.nupkg`. The id is
//! recovered by locating the first `.N.N.N` version anchor in the name.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VERSION_ANCHOR: Regex = Regex::new(r"\.\d+\.\d+\.\d+").unwrap();
}

/// Package identifier embedded in a file name
///
/// Everything before the first `.N.N.N` anchor, or the whole input when
/// the name carries no version. Case is preserved.
///
/// ```
/// use nuget_push::artifacts::parse_package_id;
///
/// assert_eq!(parse_package_id("That.Package.2.2.0-alpha"), "That.Package");
/// assert_eq!(parse_package_id("NoVersionHere"), "NoVersionHere");
/// ```
pub fn parse_package_id(file_name: &str) -> &str {
    split_identity(file_name).0
}

/// Split a file name (extension already stripped) into id and version text
///
/// The version text starts after the anchor's leading dot and runs to the
/// end of the input; it is `None` when no anchor exists.
pub fn split_identity(file_name: &str) -> (&str, Option<&str>) {
    match VERSION_ANCHOR.find(file_name) {
        Some(anchor) => (
            &file_name[..anchor.start()],
            Some(&file_name[anchor.start() + 1..]),
        ),
        None => (file_name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_id() {
        assert_eq!(parse_package_id("This.Package.1.2.3"), "This.Package");
        assert_eq!(parse_package_id("That.Package.2.2.0-alpha"), "That.Package");
        assert_eq!(
            parse_package_id("Dapper.Entities.PostgreSql.8.0.0-alpha"),
            "Dapper.Entities.PostgreSql"
        );
    }

    #[test]
    fn test_parse_package_id_without_version() {
        assert_eq!(parse_package_id("NoVersionHere"), "NoVersionHere");
        assert_eq!(parse_package_id(""), "");
    }

    #[test]
    fn test_first_anchor_wins() {
        assert_eq!(parse_package_id("Foo.1.2.3.Bar.4.5.6"), "Foo");
    }

    #[test]
    fn test_anchor_requires_literal_dots() {
        // Characters other than '.' between the numbers are not an anchor
        assert_eq!(parse_package_id("Lib_1_2_3"), "Lib_1_2_3");
        assert_eq!(parse_package_id("Lib.1-2-3"), "Lib.1-2-3");
    }

    #[test]
    fn test_id_keeps_case() {
        assert_eq!(parse_package_id("My.LIB.1.0.0"), "My.LIB");
    }

    #[test]
    fn test_parse_digits_in_identifier() {
        assert_eq!(parse_package_id("Log4Net.Ext.2.0.1"), "Log4Net.Ext");
        // An identifier that itself ends in a numeric triple is ambiguous
        assert_eq!(parse_package_id("Lib.1.2.3.4.5.6"), "Lib");
    }

    #[test]
    fn test_split_identity() {
        assert_eq!(
            split_identity("Foo.Bar.1.2.3-beta.1"),
            ("Foo.Bar", Some("1.2.3-beta.1"))
        );
        assert_eq!(split_identity("Foo"), ("Foo", None));
    }
}
