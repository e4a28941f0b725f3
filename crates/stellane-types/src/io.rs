/// Readiness interest a registration cares about. Bitflags-shaped but kept
/// as a small struct of bools for clarity at call sites — the mask is never
/// large enough to warrant a `bitflags!` type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
    pub accept: bool,
    pub connect: bool,
    pub closed: bool,
    pub timeout: bool,
}

impl Interest {
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
        accept: false,
        connect: false,
        closed: false,
        timeout: false,
    };
    pub const WRITABLE: Self = Self {
        readable: false,
        writable: true,
        accept: false,
        connect: false,
        closed: false,
        timeout: false,
    };

    pub const fn is_empty(self) -> bool {
        !(self.readable
            || self.writable
            || self.accept
            || self.connect
            || self.closed
            || self.timeout)
    }

    pub const fn union(self, other: Self) -> Self {
        Self {
            readable: self.readable || other.readable,
            writable: self.writable || other.writable,
            accept: self.accept || other.accept,
            connect: self.connect || other.connect,
            closed: self.closed || other.closed,
            timeout: self.timeout || other.timeout,
        }
    }
}
