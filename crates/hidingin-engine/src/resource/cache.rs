use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::Mutex;

use super::{ResourceError, TextureAllocator, TextureDesc, TextureRef};

/// Stable identity of a cached texture: the requesting call site plus a
/// logical purpose.
///
/// Prefer the [`texture_id!`](crate::texture_id) macro, which fills in the
/// call site.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TextureId(String);

impl TextureId {
    pub fn at_call_site(site: &str, purpose: &str) -> Self {
        Self(format!("{site}#{purpose}"))
    }

    /// Identity without a call site, for ids shared between call sites.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds a [`TextureId`](crate::resource::TextureId) from the invoking
/// module, file and line plus a purpose string.
///
/// Two invocations on different lines never collide, even with the same
/// purpose.
#[macro_export]
macro_rules! texture_id {
    ($purpose:expr) => {
        $crate::resource::TextureId::at_call_site(
            concat!(module_path!(), "@", file!(), ":", line!()),
            $purpose,
        )
    };
}

/// What the cache does when an identity is requested again with a different
/// description.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum MismatchPolicy {
    /// First request wins: the cached texture is returned unchanged and a
    /// warning is logged once per identity.
    #[default]
    Reuse,
    /// The cached texture is released and a new one allocated.
    Reallocate,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<TextureId, TextureRef>,
    warned: HashSet<TextureId>,
}

/// Process-lifetime texture cache keyed by request identity.
///
/// One mutex serializes every request. Identities come from static call
/// sites, so the cache stays small and contention light.
pub struct TextureCache {
    policy: MismatchPolicy,
    state: Mutex<CacheState>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::with_policy(MismatchPolicy::default())
    }

    pub fn with_policy(policy: MismatchPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn policy(&self) -> MismatchPolicy {
        self.policy
    }

    /// Returns the texture cached for `id`, allocating it through `device` on
    /// first request.
    pub fn request(
        &self,
        id: &TextureId,
        desc: TextureDesc,
        device: &dyn TextureAllocator,
    ) -> Result<TextureRef, ResourceError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(existing) = state.entries.get(id) {
            let cached = existing.describe();
            if cached == desc {
                return Ok(existing.clone());
            }

            match self.policy {
                MismatchPolicy::Reuse => {
                    let existing = existing.clone();
                    if state.warned.insert(id.clone()) {
                        log::warn!(
                            "texture `{id}` requested as {}x{} {:?}, reusing cached {}x{} {:?}",
                            desc.width,
                            desc.height,
                            desc.format,
                            cached.width,
                            cached.height,
                            cached.format
                        );
                    }
                    return Ok(existing);
                }
                MismatchPolicy::Reallocate => {
                    log::debug!("texture `{id}` changed description, reallocating");
                    if let Some(old) = state.entries.remove(id) {
                        old.release();
                    }
                }
            }
        }

        let texture = device.allocate(&desc, id.as_str())?;
        log::debug!(
            "allocated texture `{id}` ({}x{} {:?})",
            desc.width,
            desc.height,
            desc.format
        );
        state.entries.insert(id.clone(), texture.clone());
        Ok(texture)
    }

    /// Cached texture for `id`, without allocating.
    pub fn get(&self, id: &TextureId) -> Option<TextureRef> {
        self.state.lock().entries.get(id).cloned()
    }

    pub fn contains(&self, id: &TextureId) -> bool {
        self.state.lock().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Releases and forgets every cached texture.
    pub fn clear(&self) {
        let drained: Vec<TextureRef> = {
            let mut state = self.state.lock();
            state.warned.clear();
            state.entries.drain().map(|(_, texture)| texture).collect()
        };
        for texture in drained {
            texture.release();
        }
    }
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new()
    }
}
