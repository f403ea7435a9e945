use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
    ops::Deref,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4(pub Ipv4Addr);

impl fmt::Display for Ipv4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Deref for Ipv4 {
    type Target = Ipv4Addr;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Ipv4Addr> for Ipv4 {
    fn from(x: Ipv4Addr) -> Self {
        Self(x)
    }
}

impl From<Ipv4> for Ipv4Addr {
    fn from(x: Ipv4) -> Self {
        x.0
    }
}

impl Default for Ipv4 {
    fn default() -> Self {
        Self(Ipv4Addr::UNSPECIFIED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv6(pub Ipv6Addr);

impl fmt::Display for Ipv6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Deref for Ipv6 {
    type Target = Ipv6Addr;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Ipv6Addr> for Ipv6 {
    fn from(x: Ipv6Addr) -> Self {
        Self(x)
    }
}

impl From<Ipv6> for Ipv6Addr {
    fn from(x: Ipv6) -> Self {
        x.0
    }
}

impl Default for Ipv6 {
    fn default() -> Self {
        Self(Ipv6Addr::UNSPECIFIED)
    }
}
