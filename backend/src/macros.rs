//! Shared macros for the backend crate.

/// Generate a `fmt::Debug` implementation that redacts sensitive fields.
///
/// Field kinds, given as a keyword before the field name:
///
/// - `show field_name` - prints the field value normally
/// - `redact field_name` - prints `"[REDACTED]"` instead of the value
/// - `redact_option field_name` - prints `Some("[REDACTED]")` or `None`
///
/// # Example
///
/// ```ignore
/// redacted_debug!(HeartbeatForm {
///     show serialno,
///     show user_name,
///     redact pass_wd,
/// });
/// ```
macro_rules! redacted_debug {
    ($name:ident { $( $kind:ident $field:ident ),* $(,)? }) => {
        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let mut s = f.debug_struct(stringify!($name));
                $( redacted_debug!(@add_field s, self, $kind, $field); )*
                s.finish_non_exhaustive()
            }
        }
    };
    (@add_field $s:ident, $self:ident, show, $field:ident) => {
        $s.field(stringify!($field), &$self.$field);
    };
    (@add_field $s:ident, $self:ident, redact, $field:ident) => {
        $s.field(stringify!($field), &"[REDACTED]");
    };
    (@add_field $s:ident, $self:ident, redact_option, $field:ident) => {
        $s.field(stringify!($field), &$self.$field.as_ref().map(|_| "[REDACTED]"));
    };
}
