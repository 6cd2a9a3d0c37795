//! Logging shims.
//!
//! The crate logs through whichever backend feature is enabled: `log`, `defmt`
//! or `esp32-log` (direct `esp-println` output). With no backend enabled the
//! macros expand to nothing but still borrow their arguments so call sites do
//! not produce unused-variable warnings.

#![macro_use]
#![allow(unused_macros)]

macro_rules! __emit {
    ($level:ident, $tag:literal, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::$level!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::$level!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!(concat!("[", $tag, "] ", $s) $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => { __emit!(trace, "TRACE", $s $(, $x)*) };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => { __emit!(debug, "DEBUG", $s $(, $x)*) };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => { __emit!(info, "INFO", $s $(, $x)*) };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => { __emit!(warn, "WARN", $s $(, $x)*) };
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => { __emit!(error, "ERROR", $s $(, $x)*) };
}

/// Adapter that lets any `Debug` value be logged with `{:?}` on every backend,
/// including `defmt`, which otherwise requires `defmt::Format`.
pub(crate) struct Dbg<'a, T: ?Sized>(pub &'a T);

impl<T: core::fmt::Debug + ?Sized> core::fmt::Debug for Dbg<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(feature = "defmt")]
impl<T: core::fmt::Debug + ?Sized> defmt::Format for Dbg<'_, T> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", defmt::Debug2Format(self.0))
    }
}
