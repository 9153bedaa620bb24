//! Cursors into machine memory.
//!
//! Several RealLive commands take two memory addresses and operate on the
//! inclusive range between them, or walk forward from an origin. These
//! cursors are the decoded form of reference parameters: cheap to copy,
//! steppable, and read or written against a [`Memory`].

use reallive::intmemref::{is_string_location, IntMemRef};

use crate::error::Result;
use crate::memory::Memory;

/// A cursor over integer memory, or the store register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntReference {
    /// A bank location.
    Memory(IntMemRef),
    /// The store register; stepping it is a no-op.
    StoreRegister,
}

impl IntReference {
    /// Reads the referenced cell.
    pub fn read(&self, memory: &Memory) -> Result<i32> {
        match self {
            Self::Memory(r) => Ok(memory.int_value(*r)?),
            Self::StoreRegister => Ok(memory.store_register()),
        }
    }

    /// Writes the referenced cell.
    pub fn write(&self, memory: &mut Memory, value: i32) -> Result<()> {
        match self {
            Self::Memory(r) => Ok(memory.set_int_value(*r, value)?),
            Self::StoreRegister => {
                memory.set_store_register(value);
                Ok(())
            }
        }
    }

    /// The reference `step` elements further on.
    pub fn advanced(&self, step: i32) -> Self {
        match self {
            Self::Memory(r) => Self::Memory(r.advanced(step)),
            Self::StoreRegister => Self::StoreRegister,
        }
    }

    /// Number of cells in the inclusive range `[self, last]`, or 0 when
    /// the references cannot form one.
    pub fn distance_to(&self, last: &IntReference) -> i32 {
        match (self, last) {
            (Self::Memory(a), Self::Memory(b))
                if a.bank() == b.bank() && a.view() == b.view() =>
            {
                (b.location() - a.location() + 1).max(0)
            }
            _ => 0,
        }
    }
}

/// A cursor over one of the string banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrReference {
    ty: u8,
    location: i32,
}

impl StrReference {
    /// Builds a cursor from a bytecode string-bank byte and location.
    pub fn new(ty: u8, location: i32) -> Option<Self> {
        is_string_location(ty).then_some(Self { ty, location })
    }

    /// The bank byte.
    pub fn bank(&self) -> u8 {
        self.ty
    }

    /// The element index.
    pub fn location(&self) -> i32 {
        self.location
    }

    /// Reads the referenced cell.
    pub fn read<'m>(&self, memory: &'m Memory) -> Result<&'m [u8]> {
        Ok(memory.string_value(self.ty, self.location)?)
    }

    /// Writes the referenced cell.
    pub fn write(&self, memory: &mut Memory, value: &[u8]) -> Result<()> {
        Ok(memory.set_string_value(self.ty, self.location, value)?)
    }

    /// The reference `step` elements further on.
    pub fn advanced(&self, step: i32) -> Self {
        Self {
            ty: self.ty,
            location: self.location + step,
        }
    }

    /// Number of cells in the inclusive range `[self, last]`, or 0 when
    /// the references live in different banks.
    pub fn distance_to(&self, last: &StrReference) -> i32 {
        if self.ty == last.ty {
            (last.location - self.location + 1).max(0)
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_reference_walks_a_bank() {
        let mut memory = Memory::new();
        let origin = IntReference::Memory(IntMemRef::new(0, 0, 10));
        for i in 0..4 {
            origin.advanced(i).write(&mut memory, i * 100).unwrap();
        }
        assert_eq!(memory.int_value(IntMemRef::new(0, 0, 13)).unwrap(), 300);
        assert_eq!(origin.advanced(2).read(&memory).unwrap(), 200);
    }

    #[test]
    fn store_register_reference_ignores_steps() {
        let mut memory = Memory::new();
        let r = IntReference::StoreRegister;
        r.advanced(5).write(&mut memory, 9).unwrap();
        assert_eq!(memory.store_register(), 9);
        assert_eq!(r.distance_to(&r.advanced(3)), 0);
    }

    #[test]
    fn inclusive_distance() {
        let first = IntReference::Memory(IntMemRef::new(2, 0, 5));
        let last = IntReference::Memory(IntMemRef::new(2, 0, 9));
        assert_eq!(first.distance_to(&last), 5);
        assert_eq!(last.distance_to(&first), 0);
    }
}
