use crate::models::NewsRecord;

pub const STARTUP_TITLE: &str = "Lixia monitor started";
pub const UPDATE_TITLE: &str = "Lixia education news update";
pub const DAILY_TITLE: &str = "Lixia education news digest";
pub const ERROR_TITLE: &str = "Lixia monitor error";
pub const SHUTDOWN_TITLE: &str = "Lixia monitor shutting down";

/// How many records an update notification carries.
pub const UPDATE_BATCH: usize = 5;

fn push_record(output: &mut String, record: &NewsRecord) {
    output.push_str(&format!("Title: {}\n", record.title));
    output.push_str(&format!("Date: {}\n", record.date));
    output.push_str(&format!("Link: {}\n", record.url));
}

pub fn format_startup_message(latest: &NewsRecord) -> String {
    let mut output = String::from("Monitor started, latest entry on the page:\n\n");
    push_record(&mut output, latest);
    output.trim().to_string()
}

pub fn format_daily_message(latest: &NewsRecord) -> String {
    let mut output = String::from("Latest entry on the page:\n\n");
    push_record(&mut output, latest);
    output.trim().to_string()
}

/// Lists at most [`UPDATE_BATCH`] records, keeping page order.
pub fn format_update_message(news: &[NewsRecord]) -> String {
    let mut output = String::from("New education news detected:\n\n");

    for record in news.iter().take(UPDATE_BATCH) {
        push_record(&mut output, record);
        output.push('\n');
    }

    output.trim().to_string()
}
