use std::{
    any::Any,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, Weak},
};

#[derive(Clone)]
/// Key that compares and hashes a shared codec instance by its identity.
///
/// Two keys are equal iff they refer to the same allocation, regardless of
/// whether the codecs themselves could be compared or hashed. Two codecs
/// with equal configurations therefore still have different keys.
///
/// The key only weakly refers to its codec, so it does not keep the codec
/// alive. It does keep the codec's allocation alive, so the address it is
/// keyed by cannot be reused by another codec while the key exists.
pub struct IdentityKey {
    codec: Weak<dyn Any + Send + Sync>,
}

impl IdentityKey {
    /// Create the identity key for the `codec`.
    #[must_use]
    pub fn new<C: Any + Send + Sync>(codec: &Arc<C>) -> Self {
        let codec: Weak<C> = Arc::downgrade(codec);

        Self { codec }
    }

    /// Check if this key refers to the `codec`.
    #[must_use]
    pub fn is<C: Any + Send + Sync>(&self, codec: &Arc<C>) -> bool {
        std::ptr::addr_eq(self.codec.as_ptr(), Arc::as_ptr(codec))
    }

    /// Access the codec, if it is still alive and has type `C`.
    #[must_use]
    pub fn upgrade<C: Any + Send + Sync>(&self) -> Option<Arc<C>> {
        self.codec.upgrade()?.downcast().ok()
    }

    /// Check if the codec has been dropped.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.codec.strong_count() == 0
    }

    fn addr(&self) -> usize {
        self.codec.as_ptr().cast::<()>().addr()
    }
}

impl PartialEq for IdentityKey {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(self.codec.as_ptr(), other.codec.as_ptr())
    }
}

impl Eq for IdentityKey {}

impl Hash for IdentityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "IdentityKey({:#x})", self.addr())
    }
}
