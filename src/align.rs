/// Alignment of every block header, payload and stored size.
pub const ALIGNMENT: usize = 8;

/// Rounds a size up to [`ALIGNMENT`], or to an explicit power of two.
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(13, 32), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align!($value, $crate::align::ALIGNMENT)
  };
  ($value:expr, $align:expr) => {
    (($value) + ($align) - 1) & !(($align) - 1)
  };
}

/// Same as [`align!`] but returns `None` instead of wrapping around for
/// sizes close to `usize::MAX`.
pub fn checked_align(value: usize) -> Option<usize> {
  value
    .checked_add(ALIGNMENT - 1)
    .map(|value| value & !(ALIGNMENT - 1))
}
