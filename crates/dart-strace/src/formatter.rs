//! Pretty-printing syscall arguments.
//!
//! Each `_print_*` primitive in the original ledger formatter becomes one
//! [`ArgFormat`] variant here: a pointer (rendered as hex, or `NULL` for
//! the zero word), a bare hex integer, an octal integer (used for mode
//! bits), a signed or unsigned decimal integer, a file descriptor, and the
//! typed placeholders (`str`, `struct stat`, `iovec`, a pointer-to-integer
//! argument like `splice`'s `off_t *`) that share the same
//! null-pointer-first convention as `_util_print_nullptr_check`. The
//! original table generated one function-pointer array per syscall arity
//! (0 through 6) with a macro; a single [`Formatter`] value carrying a
//! name and a variable-length list of `ArgFormat` tags plays that role
//! here without seven near-identical array types.
//!
//! The typed placeholders can't dereference guest memory the way the
//! native primitives do (`_print_str`, `_print_struct_stat`, ... all read
//! `*(T *) val`) — this interpreter has no modeled heap to read back, so
//! they render the pointer value itself with a type tag instead of fake
//! dereferenced content.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgFormat {
    PtrHex,
    IntHex,
    IntOct,
    IntSigned,
    IntUnsigned,
    /// `_print_fd`: the low 32 bits as a signed fd number.
    Fd,
    /// `_print_str`: a `NUL`-terminated string pointer.
    Str,
    /// `_print_struct_stat`: a `struct stat *`.
    StructStat,
    /// `_print_vector_struct_iovec`: a `struct iovec *`.
    Iovec,
    /// `_print_ref_int_signed`/`_print_ref_int_unsigned`: a pointer to a
    /// single integer the syscall reads or writes through (e.g.
    /// `splice`'s `off_t *off`).
    RefInt,
}

impl ArgFormat {
    fn render(self, raw: u64) -> String {
        match self {
            ArgFormat::PtrHex => {
                if raw == 0 {
                    "NULL".to_string()
                } else {
                    format!("{raw:#x}")
                }
            }
            ArgFormat::IntHex => format!("{raw:#x}"),
            ArgFormat::IntOct => format!("{raw:#o}"),
            ArgFormat::IntSigned => format!("{}", raw as i64),
            ArgFormat::IntUnsigned => format!("{raw}"),
            ArgFormat::Fd => format!("<fd: {}>", raw as i32),
            ArgFormat::Str => Self::render_null_or(raw, "str"),
            ArgFormat::StructStat => Self::render_null_or(raw, "stat"),
            ArgFormat::Iovec => Self::render_null_or(raw, "iovec"),
            ArgFormat::RefInt => Self::render_null_or(raw, "ref_int"),
        }
    }

    fn render_null_or(raw: u64, tag: &str) -> String {
        if raw == 0 {
            "<null>".to_string()
        } else {
            format!("<{tag}@{raw:#x}>")
        }
    }
}

/// A syscall's name plus the rendering for each of its arguments, in
/// order. `args.len()` is the syscall's arity (0 through 6).
#[derive(Debug, Clone)]
pub struct Formatter {
    pub name: &'static str,
    pub args: Vec<ArgFormat>,
}

impl Formatter {
    pub fn new(name: &'static str, args: Vec<ArgFormat>) -> Self {
        assert!(args.len() <= 6, "syscall {name} declares more than 6 arguments");
        Formatter { name, args }
    }

    /// Renders `raw_args[..arity]` into a strace-style call line. Extra
    /// entries in `raw_args` beyond this syscall's arity are ignored.
    pub fn format(&self, raw_args: &[u64]) -> String {
        let rendered: Vec<String> = self
            .args
            .iter()
            .zip(raw_args.iter())
            .map(|(fmt, raw)| fmt.render(*raw))
            .collect();
        format!("{}({})", self.name, rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer_renders_as_null() {
        let f = Formatter::new("close", vec![ArgFormat::PtrHex]);
        assert_eq!(f.format(&[0]), "close(NULL)");
    }

    #[test]
    fn nonzero_pointer_renders_as_hex() {
        let f = Formatter::new("write", vec![ArgFormat::IntSigned, ArgFormat::PtrHex, ArgFormat::IntHex]);
        assert_eq!(f.format(&[1, 0x7fff0000, 128]), "write(1, 0x7fff0000, 0x80)");
    }

    #[test]
    fn mode_bits_render_as_octal() {
        let f = Formatter::new("open", vec![ArgFormat::PtrHex, ArgFormat::IntHex, ArgFormat::IntOct]);
        assert_eq!(f.format(&[0x1000, 0, 0o644]), "open(0x1000, 0x0, 0o644)");
    }

    #[test]
    fn negative_return_renders_signed() {
        let f = Formatter::new("read", vec![ArgFormat::IntSigned]);
        assert_eq!(f.format(&[(-1i64) as u64]), "read(-1)");
    }

    #[test]
    fn zero_arity_syscall_formats_with_empty_parens() {
        let f = Formatter::new("getpid", vec![]);
        assert_eq!(f.format(&[]), "getpid()");
    }

    #[test]
    fn unsigned_renders_as_plain_decimal() {
        let f = Formatter::new("readahead", vec![ArgFormat::IntUnsigned]);
        assert_eq!(f.format(&[u64::MAX]), format!("readahead({})", u64::MAX));
    }

    #[test]
    fn fd_renders_tagged_and_handles_negative_fds() {
        let f = Formatter::new("close", vec![ArgFormat::Fd]);
        assert_eq!(f.format(&[3]), "close(<fd: 3>)");
        assert_eq!(f.format(&[(-1i64) as u64]), "close(<fd: -1>)");
    }

    #[test]
    fn str_renders_null_for_zero_and_tagged_pointer_otherwise() {
        let f = Formatter::new("open", vec![ArgFormat::Str]);
        assert_eq!(f.format(&[0]), "open(<null>)");
        assert_eq!(f.format(&[0x1000]), "open(<str@0x1000>)");
    }

    #[test]
    fn struct_stat_and_iovec_and_ref_int_follow_the_same_null_convention() {
        assert_eq!(Formatter::new("stat", vec![ArgFormat::StructStat]).format(&[0]), "stat(<null>)");
        assert_eq!(
            Formatter::new("stat", vec![ArgFormat::StructStat]).format(&[0x2000]),
            "stat(<stat@0x2000>)"
        );
        assert_eq!(Formatter::new("readv", vec![ArgFormat::Iovec]).format(&[0]), "readv(<null>)");
        assert_eq!(
            Formatter::new("readv", vec![ArgFormat::Iovec]).format(&[0x3000]),
            "readv(<iovec@0x3000>)"
        );
        assert_eq!(Formatter::new("splice", vec![ArgFormat::RefInt]).format(&[0]), "splice(<null>)");
        assert_eq!(
            Formatter::new("splice", vec![ArgFormat::RefInt]).format(&[0x4000]),
            "splice(<ref_int@0x4000>)"
        );
    }
}
