//! Protocol attribute lists.
//!
//! The store never interprets attribute semantics — it reads and writes the
//! raw byte value of one configured attribute (the state token) and carries
//! whole lists around as opaque session payload.  Which numeric identity maps
//! to which protocol attribute is the dictionary's business, not ours.

/// Numeric identity of a protocol attribute.
///
/// Opaque to this crate; supplied by whoever owns the attribute dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrId(pub u32);

/// A single attribute: identity plus raw byte value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub id: AttrId,
    pub value: Vec<u8>,
}

/// An ordered list of attributes, as carried on a protocol message or as a
/// request's session-state payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrList {
    pairs: Vec<Attribute>,
}

impl AttrList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the first attribute with the given identity.
    pub fn find(&self, id: AttrId) -> Option<&Attribute> {
        self.pairs.iter().find(|a| a.id == id)
    }

    /// Append an attribute.
    pub fn add(&mut self, id: AttrId, value: Vec<u8>) {
        self.pairs.push(Attribute { id, value });
    }

    /// Remove every attribute with the given identity.
    pub fn remove(&mut self, id: AttrId) {
        self.pairs.retain(|a| a.id != id);
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.pairs.iter()
    }
}
