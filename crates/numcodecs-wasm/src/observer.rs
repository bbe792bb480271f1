use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use serde::Serializer;

use crate::{codec::Codec, error::InstrumentationError, identity::IdentityKey};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// Direction of a codec call.
pub enum CodecDirection {
    /// [`Codec::encode`]
    Encode,
    /// [`Codec::decode`] and [`Codec::decode_into`]
    Decode,
}

impl fmt::Display for CodecDirection {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match self {
            Self::Encode => "encode",
            Self::Decode => "decode",
        })
    }
}

/// Observer that measures the number of executed instructions it takes to
/// encode / decode.
///
/// The measurements are recorded per codec instance and direction, and are
/// exposed in the [`Self::encode_instructions`] and
/// [`Self::decode_instructions`] snapshots. Codecs that do not support
/// instruction counting are observed without recording anything.
#[derive(Default)]
pub struct InstructionCounterObserver {
    encode_instructions: MeasurementMap,
    decode_instructions: MeasurementMap,
}

impl InstructionCounterObserver {
    /// Create a new observer without any measurements.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-codec-instance measurements of the number of executed
    /// instructions it takes to encode.
    #[must_use]
    pub fn encode_instructions(&self) -> InstructionMeasurements {
        self.encode_instructions.snapshot()
    }

    /// Per-codec-instance measurements of the number of executed
    /// instructions it takes to decode.
    #[must_use]
    pub fn decode_instructions(&self) -> InstructionMeasurements {
        self.decode_instructions.snapshot()
    }

    /// Start observing the encoding of `data` by the `codec`.
    ///
    /// Call [`ObservationHook::finish`] on the returned hook once
    /// [`Codec::encode`] has returned.
    pub fn observe_encode<'a, C: Codec>(
        &'a self,
        codec: &'a Arc<C>,
        data: &[u8],
    ) -> ObservationHook<'a, C> {
        trace!("observing the encoding of {} bytes", data.len());

        self.observe(codec, CodecDirection::Encode)
    }

    /// Start observing the decoding of `encoded` by the `codec`, optionally
    /// into the `decoded` output.
    ///
    /// Call [`ObservationHook::finish`] on the returned hook once
    /// [`Codec::decode`] or [`Codec::decode_into`] has returned.
    pub fn observe_decode<'a, C: Codec>(
        &'a self,
        codec: &'a Arc<C>,
        encoded: &[u8],
        decoded: Option<&[u8]>,
    ) -> ObservationHook<'a, C> {
        match decoded {
            Some(decoded) => trace!(
                "observing the decoding of {} bytes into {} bytes",
                encoded.len(),
                decoded.len()
            ),
            None => trace!("observing the decoding of {} bytes", encoded.len()),
        }

        self.observe(codec, CodecDirection::Decode)
    }

    fn observe<'a, C: Codec>(
        &'a self,
        codec: &'a Arc<C>,
        direction: CodecDirection,
    ) -> ObservationHook<'a, C> {
        // codecs without an instruction counter are observed by a no-op
        let before = match codec.instruction_counter() {
            Ok(Some(before)) => before,
            Ok(None) => return ObservationHook { pending: None },
            Err(err) => {
                warn!("reading the instruction counter before {direction} failed: {err}");
                return ObservationHook { pending: None };
            },
        };

        let measurements = match direction {
            CodecDirection::Encode => &self.encode_instructions,
            CodecDirection::Decode => &self.decode_instructions,
        };

        ObservationHook {
            pending: Some(PendingMeasurement {
                measurements,
                codec,
                direction,
                before,
            }),
        }
    }
}

impl fmt::Debug for InstructionCounterObserver {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("InstructionCounterObserver")
            .field("encode_instructions", &self.encode_instructions())
            .field("decode_instructions", &self.decode_instructions())
            .finish()
    }
}

#[must_use]
/// Hook returned when starting to observe a codec call, which must be
/// [`finish`][`ObservationHook::finish`]ed after the call.
pub struct ObservationHook<'a, C: Codec> {
    pending: Option<PendingMeasurement<'a, C>>,
}

struct PendingMeasurement<'a, C: Codec> {
    measurements: &'a MeasurementMap,
    codec: &'a Arc<C>,
    direction: CodecDirection,
    before: u64,
}

impl<C: Codec> ObservationHook<'_, C> {
    /// Check if this hook will not record anything, since the codec does
    /// not support instruction counting.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.pending.is_none()
    }

    /// Finish observing the codec call by recording the number of
    /// instructions it executed.
    ///
    /// Returns the recorded number of instructions, or `None` if the codec
    /// does not support instruction counting.
    ///
    /// # Errors
    ///
    /// Errors with [`InstrumentationError::CounterRegression`] if the
    /// instruction counter decreased during the call, and with
    /// [`InstrumentationError::Counter`] if reading the counter failed. In
    /// both cases, nothing is recorded.
    pub fn finish(self) -> Result<Option<u64>, InstrumentationError> {
        let Some(PendingMeasurement {
            measurements,
            codec,
            direction,
            before,
        }) = self.pending
        else {
            return Ok(None);
        };

        let after = match codec.instruction_counter() {
            Ok(Some(after)) => after,
            Ok(None) => return Err(InstrumentationError::CounterVanished),
            Err(err) => {
                return Err(InstrumentationError::Counter {
                    source: Box::new(err),
                })
            },
        };

        let Some(delta) = after.checked_sub(before) else {
            return Err(InstrumentationError::CounterRegression { before, after });
        };

        trace!("measured {delta} instructions to {direction}");

        measurements.append(IdentityKey::new(codec), delta);

        Ok(Some(delta))
    }
}

#[derive(Default)]
struct MeasurementMap {
    series: RwLock<HashMap<IdentityKey, Arc<Mutex<Vec<u64>>>>>,
}

impl MeasurementMap {
    fn append(&self, key: IdentityKey, delta: u64) {
        // only inserting a new series requires the exclusive map lock
        let existing = self
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();

        let series = existing.unwrap_or_else(|| {
            self.series
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_default()
                .clone()
        });

        series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delta);
    }

    fn snapshot(&self) -> InstructionMeasurements {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);

        InstructionMeasurements {
            series: series
                .iter()
                .map(|(key, series)| {
                    let series = series.lock().unwrap_or_else(PoisonError::into_inner);
                    (key.clone(), Arc::from(series.as_slice()))
                })
                .collect(),
        }
    }
}

#[derive(Clone, Default)]
/// Read-only snapshot of per-codec-instance instruction measurements.
///
/// Each codec instance maps to the ordered series of the number of
/// instructions executed by its observed calls.
pub struct InstructionMeasurements {
    series: HashMap<IdentityKey, Arc<[u64]>>,
}

impl InstructionMeasurements {
    /// The measurements for the `codec`, if any were recorded.
    #[must_use]
    pub fn get<C: Codec>(&self, codec: &Arc<C>) -> Option<&[u64]> {
        self.series.get(&IdentityKey::new(codec)).map(|series| &**series)
    }

    /// Iterate over all codec instances and their measurements.
    pub fn iter(&self) -> impl Iterator<Item = (&IdentityKey, &[u64])> {
        self.series.iter().map(|(key, series)| (key, &**series))
    }

    /// The number of codec instances with measurements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Check if no measurements were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl fmt::Debug for InstructionMeasurements {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_map().entries(self.iter()).finish()
    }
}

/// Codec wrapper that transparently observes every call of the wrapped codec
/// with an [`InstructionCounterObserver`].
///
/// Instrumentation is best-effort: failing to measure a call is logged but
/// never fails the call itself.
pub struct ObservedCodec<C: Codec> {
    codec: Arc<C>,
    observer: Arc<InstructionCounterObserver>,
}

impl<C: Codec> ObservedCodec<C> {
    /// Observe all calls of the `codec` with the `observer`.
    #[must_use]
    pub const fn new(codec: Arc<C>, observer: Arc<InstructionCounterObserver>) -> Self {
        Self { codec, observer }
    }

    /// The observed codec.
    #[must_use]
    pub const fn codec(&self) -> &Arc<C> {
        &self.codec
    }

    /// The observer.
    #[must_use]
    pub const fn observer(&self) -> &Arc<InstructionCounterObserver> {
        &self.observer
    }

    fn finish(hook: ObservationHook<'_, C>) {
        if let Err(err) = hook.finish() {
            warn!("measuring the executed instructions failed: {err}");
        }
    }
}

impl<C: Codec> Clone for ObservedCodec<C> {
    fn clone(&self) -> Self {
        Self {
            codec: self.codec.clone(),
            observer: self.observer.clone(),
        }
    }
}

impl<C: Codec> Codec for ObservedCodec<C> {
    type Error = C::Error;

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let hook = self.observer.observe_encode(&self.codec, data);
        let encoded = self.codec.encode(data)?;
        Self::finish(hook);

        Ok(encoded)
    }

    fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let hook = self.observer.observe_decode(&self.codec, encoded, None);
        let decoded = self.codec.decode(encoded)?;
        Self::finish(hook);

        Ok(decoded)
    }

    fn decode_into(&self, encoded: &[u8], decoded: &mut [u8]) -> Result<(), Self::Error> {
        let hook = self
            .observer
            .observe_decode(&self.codec, encoded, Some(&*decoded));
        self.codec.decode_into(encoded, decoded)?;
        Self::finish(hook);

        Ok(())
    }

    fn get_config<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.codec.get_config(serializer)
    }

    fn instruction_counter(&self) -> Result<Option<u64>, Self::Error> {
        self.codec.instruction_counter()
    }
}
