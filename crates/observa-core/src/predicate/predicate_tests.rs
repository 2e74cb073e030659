//! Tests for predicate module

#[cfg(test)]
mod tests {
    use crate::model::{GeographicLevel, Location};
    use crate::predicate::*;
    use crate::query::LocationQuery;
    use uuid::Uuid;

    fn region(code: &str) -> Location {
        Location::new(Uuid::new_v4(), GeographicLevel::Region, code, "Region")
    }

    fn local_authority(code: &str, old_code: &str) -> Location {
        Location::new(Uuid::new_v4(), GeographicLevel::LocalAuthority, code, "Authority")
            .with_old_code(old_code)
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    #[test]
    fn test_and_drops_true_operands() {
        let p = Predicate::and(vec![
            Predicate::True,
            Predicate::level_eq(GeographicLevel::Country),
            Predicate::True,
        ]);

        assert_eq!(p, Predicate::level_eq(GeographicLevel::Country));
        assert_eq!(Predicate::and(vec![]), Predicate::True);
    }

    #[test]
    fn test_or_with_true_operand_is_true() {
        let p = Predicate::or(vec![
            Predicate::level_eq(GeographicLevel::Country),
            Predicate::True,
        ]);

        assert!(p.is_true());
        assert!(Predicate::or(vec![]).is_true());
    }

    // =========================================================================
    // Absence is unconstrained
    // =========================================================================

    #[test]
    fn test_empty_builder_matches_everything() {
        // Arrange
        let predicate = LocationPredicateBuilder::new()
            .codes(GeographicLevel::Region, Vec::<String>::new())
            .build();

        // Assert
        assert!(predicate.is_true());
        assert!(predicate.matches(&region("E12000001")));
        assert!(predicate.matches(&local_authority("E09000001", "201")));
    }

    #[test]
    fn test_from_unconstrained_query_is_true() {
        let predicate =
            LocationPredicateBuilder::from_query(&[], Some(&LocationQuery::default())).build();
        assert!(predicate.is_true());
    }

    // =========================================================================
    // Per-level clauses
    // =========================================================================

    #[test]
    fn test_region_codes_match_only_regions() {
        // Arrange
        let predicate = LocationPredicateBuilder::new()
            .codes(GeographicLevel::Region, ["E12000001"])
            .build();
        // Same code, different level.
        let collision = Location::new(
            Uuid::new_v4(),
            GeographicLevel::LocalAuthority,
            "E12000001",
            "Collision",
        );

        // Act & Assert
        assert!(predicate.matches(&region("E12000001")));
        assert!(!predicate.matches(&region("E12000002")));
        assert!(!predicate.matches(&collision));
    }

    #[test]
    fn test_implicit_level_added_without_explicit_level() {
        let predicate = LocationPredicateBuilder::new()
            .codes(GeographicLevel::Region, ["E12000001"])
            .build();

        assert_eq!(
            predicate,
            Predicate::and(vec![
                Predicate::level_eq(GeographicLevel::Region),
                Predicate::attribute_code_in(GeographicLevel::Region, ["E12000001"]),
            ])
        );
    }

    #[test]
    fn test_explicit_level_replaces_implicit_levels() {
        let predicate = LocationPredicateBuilder::new()
            .level(GeographicLevel::Region)
            .codes(GeographicLevel::Region, ["E12000001"])
            .build();

        assert_eq!(
            predicate,
            Predicate::and(vec![
                Predicate::level_eq(GeographicLevel::Region),
                Predicate::attribute_code_in(GeographicLevel::Region, ["E12000001"]),
            ])
        );
    }

    #[test]
    fn test_explicit_level_excludes_other_levels() {
        let predicate = LocationPredicateBuilder::new()
            .level(GeographicLevel::Country)
            .codes(GeographicLevel::Region, ["E12000001"])
            .build();

        assert!(!predicate.matches(&region("E12000001")));
    }

    #[test]
    fn test_local_authority_codes_split_by_length() {
        // Arrange
        let predicate = LocationPredicateBuilder::new()
            .codes(GeographicLevel::LocalAuthority, ["201", "E09000002"])
            .build();
        let by_old = local_authority("E09000001", "201");
        let by_new = local_authority("E09000002", "202");
        let neither = local_authority("E09000003", "203");

        // Act & Assert
        assert!(predicate.matches(&by_old));
        assert!(predicate.matches(&by_new));
        assert!(!predicate.matches(&neither));
    }

    #[test]
    fn test_three_char_code_does_not_match_new_code() {
        let predicate = LocationPredicateBuilder::new()
            .codes(GeographicLevel::LocalAuthority, ["E09"])
            .build();

        assert!(!predicate.matches(&local_authority("E09", "999")));
        assert!(predicate.matches(&local_authority("E09000001", "E09")));
    }

    #[test]
    fn test_levels_are_or_combined_and_ids_and_combined() {
        // Arrange
        let north_east = region("E12000001");
        let london = local_authority("E09000001", "201");
        let predicate = LocationPredicateBuilder::new()
            .location_ids([north_east.id])
            .codes(GeographicLevel::Region, ["E12000001"])
            .codes(GeographicLevel::LocalAuthority, ["E09000001"])
            .build();

        // Act & Assert
        assert!(predicate.matches(&north_east));
        assert!(!predicate.matches(&london), "id constraint is conjunctive");
    }

    // =========================================================================
    // SQL rendering
    // =========================================================================

    #[test]
    fn test_true_renders_tautology() {
        let fragment = Predicate::True.to_sql("l");
        assert_eq!(fragment.sql, "1 = 1");
        assert!(fragment.params.is_empty());
    }

    #[test]
    fn test_sql_renders_placeholders_in_order() {
        // Arrange
        let predicate = LocationPredicateBuilder::new()
            .codes(GeographicLevel::LocalAuthority, ["201", "E09000002"])
            .build();

        // Act
        let fragment = predicate.to_sql("l");

        // Assert
        assert_eq!(
            fragment.sql,
            "(l.geographic_level = ? AND ((l.geographic_level = ? AND l.old_code IN (?)) \
             OR (l.geographic_level = ? AND l.code IN (?))))"
        );
        assert_eq!(
            fragment.params,
            vec![
                "LocalAuthority",
                "LocalAuthority",
                "201",
                "LocalAuthority",
                "E09000002"
            ]
        );
    }

    #[test]
    fn test_empty_id_list_renders_contradiction() {
        let fragment = Predicate::location_id_in([]).to_sql("l");
        assert_eq!(fragment.sql, "1 = 0");
    }

    #[test]
    fn test_predicate_serde_is_tagged() {
        let json = serde_json::to_value(Predicate::level_eq(GeographicLevel::Ward)).expect("ser");
        assert_eq!(json["type"], "level_eq");
        assert_eq!(json["level"], "Ward");
    }
}
