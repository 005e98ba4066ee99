use microsim::{DateUnit, Instant, Period};
use proptest::prelude::*;

fn unit() -> impl Strategy<Value = DateUnit> {
    prop_oneof![Just(DateUnit::Day), Just(DateUnit::Month), Just(DateUnit::Year)]
}

prop_compose! {
    fn period()(
        unit in unit(),
        year in 1900i32..2100,
        month in 1u32..=12,
        day in 1u32..=28,
        size in 1u32..40,
    ) -> Period {
        let start = match unit {
            DateUnit::Day => Instant::new(year, month, day).unwrap(),
            _ => Instant::new(year, month, 1).unwrap(),
        };
        Period::new(unit, start, size).unwrap()
    }
}

proptest! {
    #[test]
    fn text_form_parses_back_to_the_same_days(p in period()) {
        let parsed: Period = p.to_string().parse().unwrap();
        prop_assert_eq!(parsed.start(), p.start());
        prop_assert_eq!(parsed.stop(), p.stop());
        prop_assert_eq!(parsed.to_string(), p.to_string());
    }

    #[test]
    fn text_form_parses_back_to_the_same_period(p in period()) {
        // Twelve months print as a year.
        prop_assume!(!(p.unit() == DateUnit::Month && p.size() == 12));
        let parsed: Period = p.to_string().parse().unwrap();
        prop_assert_eq!(parsed, p);
    }

    #[test]
    fn subperiods_tile_the_period(p in period()) {
        // Year subperiods snap to the civil year.
        prop_assume!(p.unit() != DateUnit::Year || p.start().month() == 1);
        let subs = p.subperiods(p.unit()).unwrap();
        prop_assert_eq!(subs.len(), p.size() as usize);
        prop_assert_eq!(subs[0].start(), p.start());
        prop_assert_eq!(subs[subs.len() - 1].stop(), p.stop());
        for pair in subs.windows(2) {
            prop_assert_eq!(pair[0].offset(1), pair[1]);
        }
        for sub in &subs {
            prop_assert!(p.contains(sub));
        }
    }

    #[test]
    fn days_add_up(p in period()) {
        let days = p.subperiods(DateUnit::Day).unwrap();
        prop_assert_eq!(days.len() as u32, p.size_in_days().unwrap());
        prop_assert_eq!(days[0].start(), p.start());
        prop_assert_eq!(days[days.len() - 1].start(), p.stop());
    }

    #[test]
    fn offsets_of_month_aligned_periods_are_reversible(p in period(), n in -60i32..60) {
        prop_assume!(p.unit() != DateUnit::Day);
        prop_assert_eq!(p.offset(n).offset(-n), p);
    }

    #[test]
    fn ordering_follows_the_start(a in period(), b in period()) {
        if a.start() < b.start() {
            prop_assert!(a < b);
        }
    }

    #[test]
    fn every_period_lies_within_eternity(p in period()) {
        prop_assert!(Period::eternity().contains(&p));
        prop_assert!(p.contains(&p.first_day()));
        prop_assert!(p.this_year().contains(&p.first_month()));
    }
}
