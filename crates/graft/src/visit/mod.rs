//! visitor pattern helpers
mod visit_values;
pub use visit_values::VisitValues;

use crate::cursor::Cursor;

/// Visitor that is shown each subject together with its location
pub trait Visit<T> {
    fn visit(&mut self, cursor: &Cursor, value: &T);
}

// blanket impl for FnMut
impl<T, F> Visit<T> for F
where
    F: FnMut(&Cursor, &T),
{
    fn visit(&mut self, cursor: &Cursor, value: &T) {
        self(cursor, value)
    }
}
