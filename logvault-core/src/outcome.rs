/// Result of one unit of work (one build's fetch, one job's build list).
///
/// A `Recoverable` value is reported and skipped by the caller. Fatal
/// failures are never carried here: they travel as
/// `Err(ArchiverError)` out of the phase-level functions.
#[derive(Debug)]
pub enum Outcome<T, R> {
    Ok(T),
    Recoverable(R),
}

impl<T, R> Outcome<T, R> {
    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(v) => Some(v),
            Outcome::Recoverable(_) => None,
        }
    }
}

impl<T, R> From<Result<T, R>> for Outcome<T, R> {
    fn from(result: Result<T, R>) -> Self {
        match result {
            Ok(v) => Outcome::Ok(v),
            Err(r) => Outcome::Recoverable(r),
        }
    }
}
