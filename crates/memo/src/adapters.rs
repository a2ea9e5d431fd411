//! Call-site adapters
//!
//! Two ways to memoize, both running [`policy::run`]:
//! - wrappers: [`memoize`] / [`memoize_with_options`] produce a reusable
//!   [`Memoized`] function
//! - direct calls: [`eval`], [`eval_with_key`], [`eval_always`] memoize a
//!   single invocation
//!
//! ```rust,no_run
//! use memokit::{MemoConfig, MemoContext, MemoOptions, memoize, memoize_with_options};
//!
//! let ctx = MemoContext::new(MemoConfig::default())?;
//!
//! let slow = memoize(&ctx, |x: u64| x * 2);
//! assert_eq!(slow.call(10)?, 20);
//!
//! let keyed = memoize_with_options(&ctx, MemoOptions::new().key("experiment1").always(true))
//!     .wrap(|(a, b): (u64, u64)| a + b);
//! assert_eq!(keyed.call((1, 2))?, 3);
//! # Ok::<(), memokit::Error>(())
//! ```

use crate::config::{IdentityMode, MemoContext};
use crate::fingerprint::{CallableIdentity, Kwargs, fingerprint_call};
use crate::policy::{self, Outcome};
use crate::store::Location;
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Per-wrapper settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoOptions {
    /// Grouping key; entries under different keys never see each other
    pub key: Option<String>,
    /// Store every result regardless of run time
    pub always: bool,
    /// Identity of the wrapped callable, hashed when the context's
    /// [`IdentityMode`] is `Include`
    pub identity: Option<CallableIdentity>,
}

impl MemoOptions {
    /// Default options: no key, threshold applies, no identity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the grouping key
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Force or unforce storage
    #[must_use]
    pub fn always(mut self, always: bool) -> Self {
        self.always = always;
        self
    }

    /// Set the callable identity
    #[must_use]
    pub fn identity(mut self, identity: CallableIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    fn location(&self, ctx: &MemoContext, args: &impl Serialize, kwargs: &Kwargs) -> Result<Location> {
        let identity = match ctx.identity_mode() {
            IdentityMode::Ignore => None,
            IdentityMode::Include => Some(self.identity.as_ref().ok_or_else(|| {
                Error::serialization(
                    "callable identity is required but none was supplied; \
                     set MemoOptions::identity",
                )
            })?),
        };
        let fingerprint = fingerprint_call(identity, args, kwargs)?;
        Location::new(fingerprint, self.key.as_deref())
    }
}

/// A function whose results are memoized
#[derive(Debug, Clone)]
pub struct Memoized<F> {
    ctx: MemoContext,
    options: MemoOptions,
    f: F,
}

impl<F> Memoized<F> {
    /// The options this wrapper runs with
    #[must_use]
    pub fn options(&self) -> &MemoOptions {
        &self.options
    }

    /// Call through the memo, returning only the value
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the arguments cannot be
    /// fingerprinted. Memo read and write problems never surface here.
    pub fn call<A, R>(&self, args: A) -> Result<R>
    where
        F: Fn(A) -> R,
        A: Serialize,
        R: Serialize + DeserializeOwned,
    {
        self.call_traced(args).map(Outcome::into_value)
    }

    /// Call through the memo, reporting whether the memo was used
    ///
    /// # Errors
    ///
    /// Same as [`Memoized::call`].
    pub fn call_traced<A, R>(&self, args: A) -> Result<Outcome<R>>
    where
        F: Fn(A) -> R,
        A: Serialize,
        R: Serialize + DeserializeOwned,
    {
        let location = self.options.location(&self.ctx, &args, &Kwargs::new())?;
        Ok(policy::run(&self.ctx, &location, self.options.always, || {
            (self.f)(args)
        }))
    }

    /// Call a function taking keyword arguments through the memo
    ///
    /// # Errors
    ///
    /// Same as [`Memoized::call`].
    pub fn call_with_kwargs<A, R>(&self, args: A, kwargs: &Kwargs) -> Result<R>
    where
        F: Fn(A, &Kwargs) -> R,
        A: Serialize,
        R: Serialize + DeserializeOwned,
    {
        let location = self.options.location(&self.ctx, &args, kwargs)?;
        Ok(policy::run(&self.ctx, &location, self.options.always, || {
            (self.f)(args, kwargs)
        })
        .into_value())
    }
}

/// Memoize `f` with default options
#[must_use]
pub fn memoize<F>(ctx: &MemoContext, f: F) -> Memoized<F> {
    Memoized {
        ctx: ctx.clone(),
        options: MemoOptions::default(),
        f,
    }
}

/// Wrapper factory carrying options; finish with [`MemoizeWith::wrap`]
#[derive(Debug, Clone)]
pub struct MemoizeWith {
    ctx: MemoContext,
    options: MemoOptions,
}

impl MemoizeWith {
    /// Memoize `f` with these options
    #[must_use]
    pub fn wrap<F>(self, f: F) -> Memoized<F> {
        Memoized {
            ctx: self.ctx,
            options: self.options,
            f,
        }
    }
}

/// Prepare a wrapper with explicit options
#[must_use]
pub fn memoize_with_options(ctx: &MemoContext, options: MemoOptions) -> MemoizeWith {
    MemoizeWith {
        ctx: ctx.clone(),
        options,
    }
}

/// Memoize a single call of `f(args)` under `options`
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the arguments cannot be
/// fingerprinted, or [`Error::Configuration`] for an invalid key.
pub fn eval_with_options<F, A, R>(
    ctx: &MemoContext,
    options: &MemoOptions,
    f: F,
    args: A,
) -> Result<Outcome<R>>
where
    F: FnOnce(A) -> R,
    A: Serialize,
    R: Serialize + DeserializeOwned,
{
    let location = options.location(ctx, &args, &Kwargs::new())?;
    Ok(policy::run(ctx, &location, options.always, || f(args)))
}

/// Memoize a single call of `f(args)`
///
/// # Errors
///
/// See [`eval_with_options`].
pub fn eval<F, A, R>(ctx: &MemoContext, f: F, args: A) -> Result<R>
where
    F: FnOnce(A) -> R,
    A: Serialize,
    R: Serialize + DeserializeOwned,
{
    eval_with_options(ctx, &MemoOptions::new(), f, args).map(Outcome::into_value)
}

/// Memoize a single call of `f(args)` under a grouping key
///
/// # Errors
///
/// See [`eval_with_options`].
pub fn eval_with_key<F, A, R>(ctx: &MemoContext, key: &str, f: F, args: A) -> Result<R>
where
    F: FnOnce(A) -> R,
    A: Serialize,
    R: Serialize + DeserializeOwned,
{
    eval_with_options(ctx, &MemoOptions::new().key(key), f, args).map(Outcome::into_value)
}

/// Memoize a single call of `f(args)`, storing the result however fast it was
///
/// # Errors
///
/// See [`eval_with_options`].
pub fn eval_always<F, A, R>(ctx: &MemoContext, key: Option<&str>, f: F, args: A) -> Result<R>
where
    F: FnOnce(A) -> R,
    A: Serialize,
    R: Serialize + DeserializeOwned,
{
    let mut options = MemoOptions::new().always(true);
    options.key = key.map(str::to_string);
    eval_with_options(ctx, &options, f, args).map(Outcome::into_value)
}
