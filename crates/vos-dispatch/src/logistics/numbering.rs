use chrono::NaiveDate;

pub const JOB_PREFIX: &str = "TJ";
pub const ROUTE_PREFIX: &str = "RT";

/// Human facing document number: `PREFIX-YYYYMMDD-NNN`, where `NNN` follows the highest
/// suffix already issued that day.
pub fn document_number(prefix: &str, day: NaiveDate, last_issued: usize) -> String {
    format!("{prefix}-{}-{:03}", day.format("%Y%m%d"), last_issued + 1)
}

pub fn job_number(day: NaiveDate, last_issued: usize) -> String {
    document_number(JOB_PREFIX, day, last_issued)
}

pub fn route_number(day: NaiveDate, last_issued: usize) -> String {
    document_number(ROUTE_PREFIX, day, last_issued)
}

/// The `NNN` suffix of `number` when it was issued under `prefix` on `day`.
pub fn sequence_of(number: &str, prefix: &str, day: NaiveDate) -> Option<usize> {
    let rest = number.strip_prefix(prefix)?.strip_prefix('-')?;
    let (stamp, suffix) = rest.split_once('-')?;
    if stamp != day.format("%Y%m%d").to_string() {
        return None;
    }
    suffix.parse().ok()
}

/// Highest suffix among `numbers` issued under `prefix` on `day`; zero when none was.
pub fn last_issued<'a, I>(numbers: I, prefix: &str, day: NaiveDate) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    numbers
        .into_iter()
        .filter_map(|number| sequence_of(number, prefix, day))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 22).expect("valid date")
    }

    #[test]
    fn numbers_are_date_stamped_and_padded() {
        assert_eq!(job_number(day(), 0), "TJ-20241222-001");
        assert_eq!(route_number(day(), 41), "RT-20241222-042");
        assert_eq!(job_number(day(), 1200), "TJ-20241222-1201");
    }

    #[test]
    fn next_number_follows_the_highest_suffix_of_the_day() {
        // 002 was deleted; two numbers remain for the day.
        let issued = [
            "TJ-20241222-001",
            "TJ-20241222-003",
            "TJ-20241221-009",
            "RT-20241222-007",
            "legacy-42",
        ];
        let last = last_issued(issued, JOB_PREFIX, day());
        assert_eq!(last, 3);
        assert_eq!(job_number(day(), last), "TJ-20241222-004");
        assert_eq!(last_issued(issued, ROUTE_PREFIX, day()), 7);
        assert_eq!(last_issued(Vec::<&str>::new(), ROUTE_PREFIX, day()), 0);
    }

    #[test]
    fn suffix_parsing_ignores_other_days_and_prefixes() {
        assert_eq!(sequence_of("TJ-20241222-1201", JOB_PREFIX, day()), Some(1201));
        assert_eq!(sequence_of("TJ-20241223-001", JOB_PREFIX, day()), None);
        assert_eq!(sequence_of("RT-20241222-001", JOB_PREFIX, day()), None);
        assert_eq!(sequence_of("TJ-20241222-abc", JOB_PREFIX, day()), None);
    }
}
