use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::Display;

static NEXT_ALIAS_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_VARIABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one declared row source (table, select) in a query tree.
///
/// Two aliases are equal iff they were minted by the same call to [`TableAlias::new`]. Cloning
/// an alias copies the identity, it never creates a new one. Ids come from a process wide
/// counter, so aliases minted for independent trees never collide either.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display(fmt = "t{}", id)]
pub struct TableAlias {
    id: u64,
}

impl TableAlias {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            id: NEXT_ALIAS_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A locally bound variable of a command block. Equality is identity, like [`TableAlias`]; the
/// name is only used for display.
#[derive(Clone, Debug, Display)]
#[display(fmt = "@{}{}", name, id)]
pub struct Variable {
    id: u64,
    name: Rc<str>,
}

impl Variable {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        Self {
            id: NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed),
            name: Rc::from(name.as_ref()),
        }
    }

    /// A new identity carrying the same display name.
    pub fn fresh(&self) -> Self {
        Self::new(&*self.name)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
