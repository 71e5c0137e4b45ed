/// Byte-level change detection against the last fetched page body.
///
/// Only the latest snapshot is kept. The first body seen becomes the baseline
/// and is never reported as a change.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    snapshot: Option<String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_update(&mut self, body: String) -> bool {
        match &self.snapshot {
            None => {
                self.snapshot = Some(body);
                false
            }
            Some(previous) if *previous == body => false,
            Some(_) => {
                self.snapshot = Some(body);
                true
            }
        }
    }

    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }
}
