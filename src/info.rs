//! General information about the crate and the emulator core it implements.

use crate::gen::{COMPILATION_DATE, COMPILATION_TIME, COMPILER, COMPILER_VERSION, NAME, VERSION};

pub struct Info;

impl Info {
    /// Obtains the name of the emulator core.
    pub fn name() -> String {
        let mut chars = NAME.chars();
        match chars.next() {
            None => String::new(),
            Some(chr) => chr.to_uppercase().collect::<String>() + chars.as_str(),
        }
    }

    /// Obtains the name of the emulator core in lowercase, useful for file
    /// paths and other contexts where capitalization would be unwanted.
    pub fn name_lower() -> String {
        String::from(NAME)
    }

    /// Obtains the version of the emulator core.
    pub fn version() -> String {
        String::from(VERSION)
    }

    /// Obtains the system this core emulates.
    pub fn system() -> String {
        String::from("Game Boy Advance")
    }

    /// Obtains the name of the compiler used to build this core.
    pub fn compiler() -> String {
        String::from(COMPILER)
    }

    pub fn compiler_version() -> String {
        String::from(COMPILER_VERSION)
    }

    pub fn compilation_date() -> String {
        String::from(COMPILATION_DATE)
    }

    pub fn compilation_time() -> String {
        String::from(COMPILATION_TIME)
    }
}

#[cfg(test)]
mod tests {
    use super::Info;

    #[test]
    fn test_name_is_capitalized() {
        assert_eq!(Info::name().chars().next().unwrap().is_uppercase(), true);
        assert_eq!(Info::name_lower(), Info::name_lower().to_lowercase());
    }

    #[test]
    fn test_system() {
        assert_eq!(Info::system(), "Game Boy Advance");
    }
}
