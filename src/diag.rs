//! Low-level diagnostic utilities for debugging purposes.
//!
//! Some of the implementations make use of unsafe code to store
//! a global instance of the emulator, used in panic diagnostics.

use std::ptr::null;

use crate::gba::GbaCore;

static mut GLOBAL_INSTANCE: *const GbaCore = null();

#[cfg(feature = "pedantic")]
pub static mut PEDANTIC: bool = true;

impl GbaCore {
    /// Sets the current instance as the one used for panic diagnostics.
    pub fn set_diag(&self) {
        self.set_global();
    }

    pub fn unset_diag(&self) {
        self.unset_global();
    }

    pub fn dump_diagnostics() {
        if let Some(core) = Self::global() {
            core.dump_diagnostics_s();
        }
    }

    fn global() -> Option<&'static Self> {
        unsafe {
            if GLOBAL_INSTANCE.is_null() {
                None
            } else {
                Some(&*GLOBAL_INSTANCE)
            }
        }
    }

    fn set_global(&self) {
        unsafe {
            GLOBAL_INSTANCE = self;
        }
    }

    fn unset_global(&self) {
        unsafe {
            GLOBAL_INSTANCE = null();
        }
    }

    fn dump_diagnostics_s(&self) {
        println!("Dumping gba-core diagnostics:");
        println!("{}", self.description_debug());
    }
}

#[cfg(feature = "pedantic")]
#[macro_export]
macro_rules! enable_pedantic {
    () => {
        unsafe {
            $crate::diag::PEDANTIC = true;
        }
    };
}

#[cfg(not(feature = "pedantic"))]
#[macro_export]
macro_rules! enable_pedantic {
    () => {};
}

#[macro_export]
macro_rules! panic_gb {
    ($msg:expr) => {{
        $crate::gba::GbaCore::dump_diagnostics();
        panic!($msg);
    }};
    ($fmt:expr, $($arg:tt)*) => {{
        $crate::gba::GbaCore::dump_diagnostics();
        panic!($fmt, $($arg)*);
    }};
}

#[macro_export]
macro_rules! assert_gb {
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::gba::GbaCore::dump_diagnostics();
            panic!($fmt, $($arg)*);
        }
    };
    ($cond:expr) => {
        $crate::assert_gb!($cond, stringify!($cond));
    };
}

#[cfg(feature = "pedantic")]
#[macro_export]
macro_rules! assert_pedantic_gb {
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if unsafe { $crate::diag::PEDANTIC } {
            $crate::assert_gb!($cond, $fmt, $($arg)*);
        }
    };
    ($cond:expr) => {
        if unsafe { $crate::diag::PEDANTIC } {
            $crate::assert_gb!($cond);
        }
    };
}

#[cfg(not(feature = "pedantic"))]
#[macro_export]
macro_rules! assert_pedantic_gb {
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        ()
    };
    ($cond:expr) => {
        ()
    };
}
