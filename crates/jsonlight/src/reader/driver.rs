//! Readers that feed a [`ReaderCore`] from a string, a [`Read`] or a tokio
//! `AsyncRead`.

use std::io::{self, Read};

use log::trace;

use super::{ReaderCore, ReaderState, ReaderTarget, SharedModel};
use crate::{
    error::{ReaderError, Result},
    item::{Item, ReaderEvent},
    options::ReaderOptions,
    token::Tokenizer,
};

/// Runs one step, rolling the core back when it ran out of input.
///
/// `None` means the step needs more input.
fn try_step(core: &mut ReaderCore) -> Option<Result<bool>> {
    let snapshot = (!core.is_input_complete()).then(|| core.clone());
    match core.step() {
        Err(ReaderError::Pending) => match snapshot {
            Some(snapshot) => {
                *core = snapshot;
                None
            }
            None => {
                core.fail();
                Some(Err(ReaderError::UnexpectedEndOfInput))
            }
        },
        other => Some(other),
    }
}

/// Hands the outcome of one read of the source to the core. A read of zero
/// bytes ends the input.
fn accept(core: &mut ReaderCore, read: io::Result<usize>, buffer: &[u8]) -> Result<()> {
    match read {
        Ok(0) => {
            trace!("end of input");
            core.finish_input();
            Ok(())
        }
        Ok(n) => {
            trace!("read {n} bytes");
            core.feed(&buffer[..n]);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
        Err(e) => {
            core.fail();
            Err(ReaderError::Io(e))
        }
    }
}

/// A pull reader over a complete string or a blocking [`Read`].
///
/// [`ResourceReader::read`] moves to the next state; the reader is also an
/// [`Iterator`] of [`ReaderEvent`]s that ends after the first error.
///
/// ```
/// use std::sync::Arc;
///
/// use jsonlight::{EdmModel, PrimitiveKind, ReaderEvent, ReaderOptions, ReaderTarget, ResourceReader, StructuredType, TypeRef};
///
/// let model = EdmModel::new()
///     .with_type(
///         StructuredType::entity("NS.Person")
///             .key("Id")
///             .property("Id", TypeRef::primitive(PrimitiveKind::Int32)),
///     )
///     .with_entity_set("People", "NS.Person");
/// let json = r#"{"@odata.context":"$metadata#People","value":[{"Id":1},{"Id":2}]}"#;
/// let reader = ResourceReader::from_str(json, Arc::new(model), ReaderTarget::resource_set("People"), ReaderOptions::default());
/// let ends = reader
///     .filter(|e| matches!(e, Ok(ReaderEvent::ResourceEnd(_))))
///     .count();
/// assert_eq!(ends, 2);
/// ```
#[derive(Debug)]
pub struct ResourceReader<R = io::Empty> {
    core: ReaderCore,
    source: R,
    buffer: Vec<u8>,
    exhausted: bool,
}

impl ResourceReader {
    /// A reader over a complete payload.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str, model: SharedModel, target: ReaderTarget, options: ReaderOptions) -> Self {
        let core = ReaderCore::new(Tokenizer::from_complete(json), model, target, options);
        Self::with_core(core, io::empty())
    }
}

impl<R: Read> ResourceReader<R> {
    /// A reader pulling input from `source` in chunks of
    /// [`ReaderOptions::chunk_size`] bytes.
    pub fn from_reader(source: R, model: SharedModel, target: ReaderTarget, options: ReaderOptions) -> Self {
        Self::with_core(ReaderCore::new(Tokenizer::new(), model, target, options), source)
    }

    /// A reader driving `core`, which may already hold input.
    pub fn with_core(core: ReaderCore, source: R) -> Self {
        let buffer = vec![0; core.options().chunk_size.max(1)];
        Self {
            core,
            source,
            buffer,
            exhausted: false,
        }
    }

    /// Moves to the next state. Returns `false` once the payload is
    /// complete.
    ///
    /// # Errors
    ///
    /// Read and I/O errors. After one, the reader is in
    /// [`ReaderState::Exception`] and every further call fails with
    /// [`ReaderError::Poisoned`].
    pub fn read(&mut self) -> Result<bool> {
        loop {
            if let Some(result) = try_step(&mut self.core) {
                return result;
            }
            let read = self.source.read(&mut self.buffer);
            accept(&mut self.core, read, &self.buffer)?;
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.core.state()
    }

    /// The item of the current state.
    #[must_use]
    pub fn item(&self) -> &Item {
        self.core.item()
    }

    /// The underlying state machine.
    #[must_use]
    pub fn core(&self) -> &ReaderCore {
        &self.core
    }
}

impl<R: Read> Iterator for ResourceReader<R> {
    type Item = Result<ReaderEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        loop {
            match self.read() {
                Ok(true) => {
                    if let Some(event) = self.core.event() {
                        return Some(Ok(event));
                    }
                }
                Ok(false) => {
                    self.exhausted = true;
                    return None;
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(feature = "tokio")]
pub use self::tokio_reader::AsyncResourceReader;

#[cfg(feature = "tokio")]
mod tokio_reader {
    use tokio::io::{AsyncRead, AsyncReadExt};

    use super::{accept, try_step};
    use crate::{
        error::Result,
        item::{Item, ReaderEvent},
        options::ReaderOptions,
        reader::{ReaderCore, ReaderState, ReaderTarget, SharedModel},
        token::Tokenizer,
    };

    /// A reader pulling input from a tokio [`AsyncRead`].
    ///
    /// Steps are the same as [`ResourceReader`](super::ResourceReader)'s;
    /// only refills wait.
    #[derive(Debug)]
    pub struct AsyncResourceReader<R> {
        core: ReaderCore,
        source: R,
        buffer: Vec<u8>,
        exhausted: bool,
    }

    impl<R: AsyncRead + Unpin> AsyncResourceReader<R> {
        /// A reader pulling input from `source` in chunks of
        /// [`ReaderOptions::chunk_size`] bytes.
        pub fn new(source: R, model: SharedModel, target: ReaderTarget, options: ReaderOptions) -> Self {
            let buffer = vec![0; options.chunk_size.max(1)];
            Self {
                core: ReaderCore::new(Tokenizer::new(), model, target, options),
                source,
                buffer,
                exhausted: false,
            }
        }

        /// Moves to the next state. Returns `false` once the payload is
        /// complete.
        ///
        /// # Errors
        ///
        /// Read and I/O errors, as for the blocking reader.
        pub async fn read(&mut self) -> Result<bool> {
            loop {
                if let Some(result) = try_step(&mut self.core) {
                    return result;
                }
                let read = self.source.read(&mut self.buffer).await;
                accept(&mut self.core, read, &self.buffer)?;
            }
        }

        /// The next event, or `None` after the last one or after an error.
        pub async fn next_event(&mut self) -> Option<Result<ReaderEvent>> {
            if self.exhausted {
                return None;
            }
            loop {
                match self.read().await {
                    Ok(true) => {
                        if let Some(event) = self.core.event() {
                            return Some(Ok(event));
                        }
                    }
                    Ok(false) => {
                        self.exhausted = true;
                        return None;
                    }
                    Err(e) => {
                        self.exhausted = true;
                        return Some(Err(e));
                    }
                }
            }
        }

        /// The current state.
        #[must_use]
        pub fn state(&self) -> ReaderState {
            self.core.state()
        }

        /// The item of the current state.
        #[must_use]
        pub fn item(&self) -> &Item {
            self.core.item()
        }
    }
}
