//! Kernel command-line: a single `key=value` token list.
//!
//! `bootloader_api` 0.11 does not forward a firmware/bootloader command
//! line to the kernel, so the only token the core currently recognizes
//! (`spec.md` §4.I step 4: `heap=nitro|legacy`) is baked in at build time
//! via the `NITROS_CMDLINE` environment variable, read with `option_env!`.
//! Anything parsed out of it still goes through the same `key=value`
//! scanner a real firmware-supplied string would use, so plugging in a
//! genuine bootloader command line later is a one-line change here.

/// The raw command-line string compiled into this kernel.
pub fn raw() -> &'static str {
    option_env!("NITROS_CMDLINE").unwrap_or("")
}

/// Look up `key` in the command line, returning the text after its `=`.
pub fn get(key: &str) -> Option<&'static str> {
    raw().split_whitespace().find_map(|token| {
        let (k, v) = token.split_once('=')?;
        if k == key {
            Some(v)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_none() {
        assert_eq!(get("does-not-exist"), None);
    }
}
