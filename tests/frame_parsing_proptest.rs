//! Property tests for the force/torque line parser.

use proptest::prelude::*;
use trial_daq::core::Readings;
use trial_daq::instrument::parse_frame;

proptest! {
    #[test]
    fn seven_integer_fields_always_parse(
        tag in any::<i32>(),
        counts in proptest::array::uniform6(-1_000_000i64..1_000_000),
    ) {
        let line = format!(
            "{},{},{},{},{},{},{}\r\n",
            tag, counts[0], counts[1], counts[2], counts[3], counts[4], counts[5]
        );
        match parse_frame(&line) {
            Readings::Channels(values) => {
                for i in 0..3 {
                    prop_assert_eq!(values[i], counts[i] as f64 / 200.0);
                }
                for i in 3..6 {
                    prop_assert_eq!(values[i], counts[i] as f64 / 8000.0);
                }
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    #[test]
    fn wrong_field_count_is_invalid(
        fields in proptest::collection::vec(-1000i64..1000, 0..12)
            .prop_filter("seven fields is a valid frame", |f| f.len() != 7),
    ) {
        let line = fields
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        prop_assert_eq!(parse_frame(&line), Readings::Invalid);
    }

    #[test]
    fn arbitrary_text_never_panics(line in ".*") {
        let _ = parse_frame(&line);
    }
}
