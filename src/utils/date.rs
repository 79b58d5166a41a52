use chrono::NaiveDate;

pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
