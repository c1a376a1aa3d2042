//! Namespaces used by the wire schema.

/// The XML namespaces the protocol schema is defined in.
///
/// Every element the readers and writers touch is qualified by one of
/// these. Elements in foreign namespaces are still representable on the
/// read side (they surface with their raw prefix and are skippable), but
/// nothing in this stack ever emits one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// SOAP envelope namespace.
    Soap,
    /// Operation request/response message namespace.
    Messages,
    /// Shared schema type namespace.
    Types,
}

impl Namespace {
    /// Returns the namespace URI.
    pub fn uri(self) -> &'static str {
        match self {
            Namespace::Soap => "http://schemas.xmlsoap.org/soap/envelope/",
            Namespace::Messages => {
                "http://schemas.microsoft.com/exchange/services/2006/messages"
            }
            Namespace::Types => "http://schemas.microsoft.com/exchange/services/2006/types",
        }
    }

    /// Returns the conventional prefix used on the wire.
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Soap => "soap",
            Namespace::Messages => "m",
            Namespace::Types => "t",
        }
    }

    /// Resolves a wire prefix back to a namespace.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "soap" => Some(Namespace::Soap),
            "m" => Some(Namespace::Messages),
            "t" => Some(Namespace::Types),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_roundtrip() {
        for ns in [Namespace::Soap, Namespace::Messages, Namespace::Types] {
            assert_eq!(Namespace::from_prefix(ns.prefix()), Some(ns));
        }
        assert_eq!(Namespace::from_prefix("x"), None);
    }
}
