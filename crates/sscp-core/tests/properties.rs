use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use sscp_core::encoding::Reader;
use sscp_core::frame;
use sscp_core::ieee754;
use sscp_core::pdu::{DecodedRequest, ErrorResponse, LoginResponse};
use sscp_core::schedule::{BaseSchedule, ExceptionSchedule};
use sscp_core::variable::{NewValue, Value, VarType, Variable};

fn monday() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 13)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap()
}

proptest! {
    #[test]
    fn float_roundtrip_within_rounding(value in -1.0e30f64..1.0e30f64) {
        let var = Variable::new(1, 0, 4, VarType::Float32).writable();
        let raw = var.encode(&NewValue::Float(value), None).unwrap();
        let decoded = match var.decode(&raw) {
            Value::Float(decoded) => decoded,
            other => panic!("unexpected value {other:?}"),
        };
        let tolerance = value.abs() * 2f64.powi(-22) + f64::from(f32::MIN_POSITIVE);
        prop_assert!((decoded - value).abs() <= tolerance);
    }

    #[test]
    fn float_encode_matches_native_for_exact_values(value in any::<f32>().prop_filter("finite normal", |v| v.is_normal())) {
        prop_assert_eq!(ieee754::encode(f64::from(value)), value.to_bits());
        prop_assert_eq!(ieee754::decode(value.to_bits()), f64::from(value));
    }

    #[test]
    fn integer_roundtrip(value in any::<u16>()) {
        let var = Variable::new(2, 0, 2, VarType::Int16).writable();
        let raw = var.encode(&NewValue::Integer(i64::from(value)), None).unwrap();
        prop_assert_eq!(var.decode(&raw), Value::Integer(u64::from(value)));
    }

    #[test]
    fn random_reply_decode_does_not_panic(data in proptest::collection::vec(any::<u8>(), 0..300)) {
        let _ = frame::decode_reply(&mut Reader::new(&data));
        let _ = LoginResponse::decode(&mut Reader::new(&data));
        let _ = ErrorResponse::decode(&mut Reader::new(&data));
        let _ = DecodedRequest::decode(0x0500, &data);
        let _ = DecodedRequest::decode(0x0510, &data);
        let _ = BaseSchedule::decode(&data);
        let _ = ExceptionSchedule::decode(&data);
    }

    #[test]
    fn base_add_then_remove_is_identity(day in 0i64..7, start in 0i64..1380, len in 1i64..60, slots in 3usize..16) {
        let schedule = BaseSchedule::empty(slots);
        let begin = monday() + Duration::days(day) + Duration::minutes(start);
        let end = begin + Duration::minutes(len);
        let now = monday() + Duration::hours(60);

        let added = schedule.add_event(begin, end, true, now).unwrap();
        let added = BaseSchedule::decode(&added).unwrap();
        prop_assert_eq!(added.to_events(now).len(), 1);
        let removed = added.remove_event(begin, end, true, now).unwrap();
        prop_assert_eq!(removed, schedule.encode());
    }

    #[test]
    fn base_add_beside_existing_event_is_reversible(day in 0i64..7, start in 0i64..1380, len in 1i64..60, slots in 5usize..16) {
        // Monday 08:00-17:00 already programmed.
        let mut raw = vec![0u8; slots * 8];
        raw[8..10].copy_from_slice(&480u16.to_be_bytes());
        raw[12..14].copy_from_slice(&1u16.to_be_bytes());
        raw[16..18].copy_from_slice(&1020u16.to_be_bytes());
        let schedule = BaseSchedule::decode(&raw).unwrap();

        // On Monday, end at or before 08:00 (exactly 08:00 when start % 420 == 0).
        let begin = if day == 0 {
            monday() + Duration::minutes(480 - start % 420 - len)
        } else {
            monday() + Duration::days(day) + Duration::minutes(start)
        };
        let end = begin + Duration::minutes(len);
        let now = monday() + Duration::hours(60);

        let added = schedule.add_event(begin, end, true, now).unwrap();
        let added = BaseSchedule::decode(&added).unwrap();
        let events = added.to_events(now);
        prop_assert_eq!(events.len(), 2);
        prop_assert!(events.iter().any(|event| event.start == begin && event.end == end));
        let has_base_event = events.iter().any(|event| {
            event.start == monday() + Duration::hours(8) && event.end == monday() + Duration::hours(17)
        });
        prop_assert!(has_base_event);
        let removed = added.remove_event(begin, end, true, now).unwrap();
        prop_assert_eq!(removed, raw);
    }

    #[test]
    fn exceptions_never_exceed_capacity(days in proptest::collection::vec(1i64..300, 1..12), slots in 1usize..6) {
        let mut raw = ExceptionSchedule::empty(slots).encode();
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(8, 0, 0))
            .unwrap();
        for day in &days {
            let start = base + Duration::days(*day);
            let schedule = ExceptionSchedule::decode(&raw).unwrap();
            raw = schedule.add_event(start, start + Duration::hours(2), true).unwrap();
        }
        prop_assert_eq!(raw.len(), slots * 12);
        let events = ExceptionSchedule::decode(&raw).unwrap().to_events();
        prop_assert_eq!(events.len(), days.len().min(slots));
        prop_assert!(events.windows(2).all(|pair| pair[0].start <= pair[1].start));
    }
}
