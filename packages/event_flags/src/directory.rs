use std::sync::{Arc, RwLock};

use derive_more::derive::Display;

use crate::constants::ERR_POISONED_LOCK;
use crate::{Error, Result};

/// Guest-visible id of a kernel object.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("0x{_0:08x}")]
pub struct ObjectId(u32);

impl ObjectId {
    /// Wraps a raw guest id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw guest id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// A kind of object that can live in an [`ObjectDirectory`].
///
/// Each kind has its own id layout: slot `i` is exposed to the guest as
/// `ID_BASE + i * ID_STEP`, for at most `ID_COUNT` slots.
pub trait KernelObject: Send + Sync + 'static {
    /// Human-readable name of the object kind, for diagnostics.
    const KIND: &'static str;

    /// Id of the first slot.
    const ID_BASE: u32;

    /// Distance between the ids of consecutive slots.
    const ID_STEP: u32;

    /// Maximum number of slots.
    const ID_COUNT: u32;
}

/// Allocates, resolves and removes kernel objects of one kind by guest id.
///
/// Objects are shared through [`Arc`], so a caller that resolved an id keeps a usable object even
/// if the id is removed concurrently. Callers that must not race removal use
/// [`with()`][Self::with], which holds off removal until the callback returns.
///
/// # Example
///
/// ```
/// use event_flags::{EventFlag, EventFlagAttributes, ObjectDirectory};
///
/// let directory = ObjectDirectory::<EventFlag>::new();
///
/// let id = directory
///     .allocate(EventFlag::new(EventFlagAttributes::default(), 0b1))
///     .unwrap();
/// assert_eq!(id.get(), 0x9800_0000);
///
/// assert_eq!(directory.get(id).unwrap().pattern(), 0b1);
/// ```
#[derive(Debug)]
pub struct ObjectDirectory<T> {
    slots: RwLock<Vec<Option<Arc<T>>>>,
    capacity: usize,
}

impl<T> ObjectDirectory<T>
where
    T: KernelObject,
{
    /// Creates a directory that can hold the full id range of `T`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// Creates a directory that holds at most `capacity` objects, clamped to the id range of `T`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let id_count = usize::try_from(T::ID_COUNT).unwrap_or(usize::MAX);

        Self {
            slots: RwLock::new(Vec::new()),
            capacity: capacity.min(id_count),
        }
    }

    /// Maximum number of objects the directory can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of objects currently in the directory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .expect(ERR_POISONED_LOCK)
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Whether the directory holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `object` in the lowest free slot and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if every slot is taken.
    pub fn allocate(&self, object: T) -> Result<ObjectId> {
        let mut slots = self.slots.write().expect(ERR_POISONED_LOCK);

        let index = match slots.iter().position(Option::is_none) {
            Some(index) => index,
            None if slots.len() < self.capacity => {
                slots.push(None);
                slots.len().checked_sub(1).expect("we just pushed a slot")
            }
            None => return Err(Error::ResourceExhausted),
        };

        let slot = slots.get_mut(index).expect("index refers to an existing slot");
        *slot = Some(Arc::new(object));

        Ok(Self::id_of(index))
    }

    /// Resolves an id.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<Arc<T>> {
        self.with(id, Arc::clone)
    }

    /// Calls `f` on the object registered under `id`, preventing its removal until `f` returns.
    ///
    /// Returns [`None`] if the id does not resolve.
    pub fn with<R>(&self, id: ObjectId, f: impl FnOnce(&Arc<T>) -> R) -> Option<R> {
        let index = Self::index_of(id)?;
        let slots = self.slots.read().expect(ERR_POISONED_LOCK);

        slots.get(index)?.as_ref().map(f)
    }

    /// Removes the object registered under `id` if `predicate` accepts it.
    ///
    /// The predicate runs under the directory's exclusive lock, so its verdict cannot be
    /// invalidated by a concurrent [`with()`][Self::with] before the removal takes effect.
    ///
    /// Returns [`None`] if the id does not resolve. Otherwise returns the removed object, or the
    /// predicate's error if it refused (in which case the object stays registered).
    pub fn remove_if<E>(
        &self,
        id: ObjectId,
        predicate: impl FnOnce(&T) -> std::result::Result<(), E>,
    ) -> Option<std::result::Result<Arc<T>, E>> {
        let index = Self::index_of(id)?;
        let mut slots = self.slots.write().expect(ERR_POISONED_LOCK);

        let slot = slots.get_mut(index)?;

        if let Err(refusal) = predicate(slot.as_ref()?) {
            return Some(Err(refusal));
        }

        slot.take().map(Ok)
    }

    fn id_of(index: usize) -> ObjectId {
        let index = u32::try_from(index).expect("slot count is bounded by ID_COUNT");

        ObjectId::new(
            index
                .checked_mul(T::ID_STEP)
                .and_then(|offset| offset.checked_add(T::ID_BASE))
                .expect("ID_BASE + ID_COUNT * ID_STEP must fit in the id space"),
        )
    }

    fn index_of(id: ObjectId) -> Option<usize> {
        let offset = id.get().checked_sub(T::ID_BASE)?;

        if T::ID_STEP == 0 || offset.checked_rem(T::ID_STEP)? != 0 {
            return None;
        }

        let index = offset.checked_div(T::ID_STEP)?;

        if index >= T::ID_COUNT {
            return None;
        }

        usize::try_from(index).ok()
    }
}

impl<T> Default for ObjectDirectory<T>
where
    T: KernelObject,
{
    fn default() -> Self {
        Self::new()
    }
}
