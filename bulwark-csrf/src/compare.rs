use subtle::ConstantTimeEq;

/// Compare two byte strings in constant time.
///
/// Length is not secret, so differing lengths return early. Once lengths
/// match, every byte pair is visited regardless of where the first
/// difference sits.
pub fn timed_equals(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}
