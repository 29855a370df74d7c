// Property: Range headers are parsed literally and resolved against the file
// size without ever producing a range outside the file.

use audio_cache_server::{parse_range_header, ByteRange, RangeParser, StreamError};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Both bounds present: parsed exactly as written, in either order
    #[test]
    fn prop_both_bounds_parsed(start in any::<u64>(), end in any::<u64>()) {
        let header = format!("bytes={}-{}", start, end);
        let expected = ByteRange::new(Some(start), Some(end));

        prop_assert_eq!(parse_range_header(Some(&header)), expected);
        prop_assert_eq!(RangeParser::strict().parse(Some(&header)).unwrap(), expected);
    }

    /// Open end: only the start is present
    #[test]
    fn prop_open_end_parsed(start in any::<u64>()) {
        let header = format!("bytes={}-", start);
        prop_assert_eq!(parse_range_header(Some(&header)), ByteRange::new(Some(start), None));
    }

    /// Suffix form is treated as no range at all
    #[test]
    fn prop_suffix_is_unbounded(n in any::<u64>()) {
        let header = format!("bytes=-{}", n);
        prop_assert_eq!(parse_range_header(Some(&header)), ByteRange::unbounded());
        prop_assert_eq!(RangeParser::strict().parse(Some(&header)).unwrap(), ByteRange::unbounded());
    }

    /// Lenient parsing never fails, whatever the header contains
    #[test]
    fn prop_lenient_never_fails(header in ".*") {
        prop_assert!(RangeParser::new().parse(Some(&header)).is_ok());
    }

    /// Resolved partial ranges stay inside the file and are non-empty
    #[test]
    fn prop_resolved_range_within_file(
        start in 0u64..20_000,
        end in proptest::option::of(0u64..20_000),
        size in 1u64..10_000,
    ) {
        let parser = RangeParser::new();
        let requested = ByteRange::new(Some(start), end);

        match parser.resolve(&requested, size) {
            Ok(resolved) => {
                prop_assert!(resolved.length >= 1);
                prop_assert!(resolved.start + resolved.length <= size);
                prop_assert_eq!(resolved.total, size);
                if resolved.partial {
                    prop_assert_eq!(resolved.start, start);
                    let expected_end = end.map_or(size - 1, |e| e.min(size - 1));
                    prop_assert_eq!(resolved.end(), expected_end);
                    prop_assert_eq!(
                        resolved.content_range(),
                        format!("bytes {}-{}/{}", start, expected_end, size)
                    );
                } else {
                    // Only an inverted range falls back to the whole file.
                    prop_assert!(end.map_or(false, |e| e < start));
                    prop_assert_eq!(resolved.length, size);
                }
            }
            Err(StreamError::UnsatisfiableRange { start: s, size: total }) => {
                prop_assert!(start >= size);
                prop_assert_eq!(s, start);
                prop_assert_eq!(total, size);
            }
            Err(e) => prop_assert!(false, "unexpected error {:?}", e),
        }
    }

    /// No header means the whole file, as a plain response
    #[test]
    fn prop_no_range_is_full(size in 0u64..1_000_000) {
        let resolved = RangeParser::new().resolve(&parse_range_header(None), size).unwrap();
        prop_assert!(!resolved.partial);
        prop_assert_eq!(resolved.start, 0);
        prop_assert_eq!(resolved.length, size);
    }
}

#[test]
fn test_garbage_headers_are_ignored() {
    for header in [
        "",
        "bytes=",
        "bytes=-",
        "bytes=abc-def",
        "bytes=1-2-3",
        "bytes=0-1,5-9",
        "items=0-10",
        "bytes=+5-10",
    ] {
        assert_eq!(
            parse_range_header(Some(header)),
            ByteRange::unbounded(),
            "header {:?}",
            header
        );
    }
}

#[test]
fn test_strict_rejects_garbage() {
    let parser = RangeParser::strict();
    for header in ["bytes=", "bytes=abc-def", "bytes=1-2-3", "items=0-10"] {
        assert!(
            matches!(parser.parse(Some(header)), Err(StreamError::MalformedRange(_))),
            "header {:?}",
            header
        );
    }
}

#[test]
fn test_inverted_range_rejected_only_at_resolution() {
    let requested = parse_range_header(Some("bytes=9-3"));
    assert_eq!(requested, ByteRange::new(Some(9), Some(3)));

    let lenient = RangeParser::new().resolve(&requested, 100).unwrap();
    assert!(!lenient.partial);
    assert_eq!(lenient.length, 100);

    assert!(matches!(
        RangeParser::strict().resolve(&requested, 100),
        Err(StreamError::MalformedRange(_))
    ));
}

#[test]
fn test_strict_rejects_inverted_after_clamping() {
    // 900-950 is well formed but lies past a 100 byte file.
    let parser = RangeParser::strict();
    let err = parser
        .resolve(&ByteRange::new(Some(900), Some(950)), 100)
        .unwrap_err();
    assert!(matches!(err, StreamError::UnsatisfiableRange { start: 900, size: 100 }));
}
