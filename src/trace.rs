//! Binary training trace.
//!
//! A trace records a network's topology once and then one frame of parameters per
//! training step, so a run can be replayed step by step afterwards.
//!
//! Layout (every token is one byte, see [`Token`]):
//!
//! ```text
//! header: LAYER_COUNT u32  ACTIVATION u32  (NEURON_COUNT u32) * layer_count  SEPARATOR
//! frame:  FRAME_START  (WEIGHTS v (VALUE_SEPARATOR v)*  BIASES v (VALUE_SEPARATOR v)*) * transitions  FRAME_END
//! end:    EOF
//! ```
//!
//! Integers are `u32` and values are `f64`, both in native byte order. Nothing is
//! length-prefixed: the reader derives every count from the header and checks each
//! token against the one it expects. Any mismatch is an [`Error::Format`]; there is
//! no attempt to resynchronise.
//!
//! The writer syncs after the header and after every frame, so a reader sees either
//! a complete frame or a truncated one, which it reports as a format error.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::{Activation, Error, Matrix, Network, Result, Scalar};

/// Structural markers of the trace format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Token {
    /// Terminates the header.
    Separator = 0,
    ValueSeparator = 1,
    FrameEnd = 2,
    LayerCount = 3,
    NeuronCount = 4,
    Activation = 5,
    Weights = 6,
    Biases = 7,
    FrameStart = 8,
    Eof = 9,
}

impl Token {
    /// Token that closes the header.
    pub const END_HEADER: Token = Token::Separator;
}

impl TryFrom<u8> for Token {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Token::Separator,
            1 => Token::ValueSeparator,
            2 => Token::FrameEnd,
            3 => Token::LayerCount,
            4 => Token::NeuronCount,
            5 => Token::Activation,
            6 => Token::Weights,
            7 => Token::Biases,
            8 => Token::FrameStart,
            9 => Token::Eof,
            other => return Err(Error::Format(format!("unknown token byte {other}"))),
        })
    }
}

/// Topology recorded at the start of a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeader {
    pub activation: Activation,
    pub layer_sizes: Vec<usize>,
}

impl TraceHeader {
    pub fn from_network(network: &Network) -> Self {
        Self {
            activation: network.activation(),
            layer_sizes: network.layer_sizes().to_vec(),
        }
    }

    #[inline]
    pub fn transition_count(&self) -> usize {
        self.layer_sizes.len().saturating_sub(1)
    }
}

/// Parameters of one layer transition inside a [`Frame`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionParams {
    /// `layer_sizes[t]` rows by `layer_sizes[t + 1]` cols.
    pub weights: Matrix,
    /// `1` row by `layer_sizes[t + 1]` cols.
    pub biases: Matrix,
}

/// One snapshot of every weight and bias, indexed by transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    transitions: Vec<TransitionParams>,
}

impl Frame {
    #[inline]
    pub fn transitions(&self) -> &[TransitionParams] {
        &self.transitions
    }

    #[inline]
    pub fn transition(&self, idx: usize) -> Option<&TransitionParams> {
        self.transitions.get(idx)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

impl Network {
    /// Build a zeroed network with the topology and activation of a trace header.
    pub fn from_header(header: &TraceHeader) -> Result<Self> {
        Network::new(&header.layer_sizes, header.activation)
    }

    /// Copy of the live weights and biases.
    pub fn snapshot(&self) -> Frame {
        let transitions = (0..self.transition_count())
            .map(|t| TransitionParams {
                weights: self.weights(t).to_owned_matrix(),
                biases: self.biases(t).to_owned_matrix(),
            })
            .collect();
        Frame { transitions }
    }

    /// Overwrite the live weights and biases with a frame's values.
    pub fn load_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.len() != self.transition_count() {
            return Err(Error::InvalidShape(format!(
                "frame has {} transitions, network has {}",
                frame.len(),
                self.transition_count()
            )));
        }
        for (t, params) in frame.transitions.iter().enumerate() {
            if !self.weights(t).same_shape(&params.weights)
                || !self.biases(t).same_shape(&params.biases)
            {
                return Err(Error::InvalidShape(format!(
                    "frame transition {t} does not match network layer sizes {:?}",
                    self.layer_sizes()
                )));
            }
        }
        for (t, params) in frame.transitions.iter().enumerate() {
            self.weights_mut(t).copy_from(&params.weights);
            self.biases_mut(t).copy_from(&params.biases);
        }
        Ok(())
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::InvalidConfig(format!("{what} {value} does not fit the trace format")))
}

fn flush_only<W: Write>(inner: &mut W) -> io::Result<()> {
    inner.flush()
}

fn flush_and_sync(inner: &mut BufWriter<File>) -> io::Result<()> {
    inner.flush()?;
    inner.get_ref().sync_data()
}

/// Streams a trace into `W`.
///
/// For anything other than [`TraceWriter::create`], wrap unbuffered sinks in a
/// `BufWriter`: every token and value is a separate `write_all`.
#[derive(Debug)]
pub struct TraceWriter<W: Write> {
    inner: W,
    header: TraceHeader,
    frames_written: usize,
    sync: fn(&mut W) -> io::Result<()>,
    /// Set once a frame write fails partway; the stream may end mid-frame.
    poisoned: bool,
}

impl TraceWriter<BufWriter<File>> {
    /// Create (or truncate) a trace file and write the header for `network`.
    ///
    /// Frames written through this writer are synced to stable storage before
    /// `write_frame` returns.
    pub fn create<P: AsRef<Path>>(path: P, network: &Network) -> Result<Self> {
        let p = path.as_ref();
        let file = File::create(p)
            .map_err(|e| Error::io(format_args!("failed to create {}", p.display()), e))?;
        Self::with_sync(BufWriter::new(file), network, flush_and_sync)
    }
}

impl<W: Write> TraceWriter<W> {
    /// Write the header for `network` into `inner` and flush.
    pub fn new(inner: W, network: &Network) -> Result<Self> {
        Self::with_sync(inner, network, flush_only::<W>)
    }

    fn with_sync(inner: W, network: &Network, sync: fn(&mut W) -> io::Result<()>) -> Result<Self> {
        let mut writer = Self {
            inner,
            header: TraceHeader::from_network(network),
            frames_written: 0,
            sync,
            poisoned: false,
        };
        writer.write_header()?;
        Ok(writer)
    }

    #[inline]
    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    #[inline]
    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    /// Whether an earlier write failed. A poisoned writer rejects every further
    /// frame and refuses to close the trace.
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    fn write_header(&mut self) -> Result<()> {
        let layer_count = to_u32(self.header.layer_sizes.len(), "layer count")?;
        let sizes = self
            .header
            .layer_sizes
            .iter()
            .map(|&n| to_u32(n, "neuron count"))
            .collect::<Result<Vec<u32>>>()?;

        self.token(Token::LayerCount)?;
        self.int(layer_count)?;
        self.token(Token::Activation)?;
        self.int(self.header.activation.tag())?;
        for n in sizes {
            self.token(Token::NeuronCount)?;
            self.int(n)?;
        }
        self.token(Token::END_HEADER)?;
        (self.sync)(&mut self.inner)?;

        log::debug!(
            "wrote trace header: layers={:?} activation={:?}",
            self.header.layer_sizes,
            self.header.activation
        );
        Ok(())
    }

    /// Append one frame holding the live weights and biases of `network`.
    ///
    /// `network` must have the topology and activation the header was written
    /// for. If writing fails partway the writer is poisoned.
    pub fn write_frame(&mut self, network: &Network) -> Result<()> {
        self.check_poisoned()?;
        if network.layer_sizes() != self.header.layer_sizes.as_slice() {
            return Err(Error::InvalidShape(format!(
                "network layer sizes {:?} do not match trace header {:?}",
                network.layer_sizes(),
                self.header.layer_sizes
            )));
        }
        if network.activation() != self.header.activation {
            return Err(Error::InvalidShape(format!(
                "network activation {:?} does not match trace header {:?}",
                network.activation(),
                self.header.activation
            )));
        }

        if let Err(e) = self.write_frame_body(network) {
            self.poisoned = true;
            log::warn!("trace frame {} failed: {e}", self.frames_written + 1);
            return Err(e);
        }

        self.frames_written += 1;
        log::trace!("wrote trace frame {}", self.frames_written);
        Ok(())
    }

    fn write_frame_body(&mut self, network: &Network) -> Result<()> {
        self.token(Token::FrameStart)?;
        for t in 0..network.transition_count() {
            self.token(Token::Weights)?;
            self.values(network.weights(t).iter())?;
            self.token(Token::Biases)?;
            self.values(network.biases(t).iter())?;
        }
        self.token(Token::FrameEnd)?;
        (self.sync)(&mut self.inner)?;
        Ok(())
    }

    /// Write the trailing `EOF` token, sync, and return the sink.
    ///
    /// Fails without writing anything if the writer is poisoned.
    pub fn finish(mut self) -> Result<W> {
        self.check_poisoned()?;
        self.token(Token::Eof)?;
        (self.sync)(&mut self.inner)?;
        log::debug!("closed trace after {} frames", self.frames_written);
        Ok(self.inner)
    }

    fn check_poisoned(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Format(format!(
                "trace writer failed during frame {}; the stream ends in a partial frame",
                self.frames_written + 1
            )));
        }
        Ok(())
    }

    #[inline]
    fn token(&mut self, token: Token) -> Result<()> {
        self.inner.write_all(&[token as u8])?;
        Ok(())
    }

    #[inline]
    fn int(&mut self, value: u32) -> Result<()> {
        self.inner.write_all(&value.to_ne_bytes())?;
        Ok(())
    }

    fn values(&mut self, values: impl Iterator<Item = Scalar>) -> Result<()> {
        for (i, v) in values.enumerate() {
            if i > 0 {
                self.token(Token::ValueSeparator)?;
            }
            self.inner.write_all(&v.to_ne_bytes())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Frames,
    Finished,
}

/// Reads a trace produced by [`TraceWriter`].
///
/// The header is parsed by [`TraceReader::new`]; frames are then pulled one at a
/// time. After `EOF` or the first error the reader is finished and yields nothing.
#[derive(Debug)]
pub struct TraceReader<R: Read> {
    inner: R,
    header: TraceHeader,
    state: ReadState,
    frames_read: usize,
}

impl TraceReader<BufReader<File>> {
    /// Open a trace file and parse its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let file = File::open(p)
            .map_err(|e| Error::io(format_args!("failed to open {}", p.display()), e))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> TraceReader<R> {
    /// Parse the header from `inner`.
    pub fn new(mut inner: R) -> Result<Self> {
        let header = read_header(&mut inner)?;
        log::debug!(
            "read trace header: layers={:?} activation={:?}",
            header.layer_sizes,
            header.activation
        );
        Ok(Self {
            inner,
            header,
            state: ReadState::Frames,
            frames_read: 0,
        })
    }

    #[inline]
    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    #[inline]
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state == ReadState::Finished
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read the next frame. Returns `Ok(None)` once `EOF` has been consumed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.state == ReadState::Finished {
            return Ok(None);
        }

        match self.read_next() {
            Ok(Some(frame)) => {
                self.frames_read += 1;
                log::trace!("read trace frame {}", self.frames_read);
                Ok(Some(frame))
            }
            Ok(None) => {
                self.state = ReadState::Finished;
                log::debug!("trace ended after {} frames", self.frames_read);
                Ok(None)
            }
            Err(e) => {
                self.state = ReadState::Finished;
                Err(e)
            }
        }
    }

    /// Read the next frame straight into the live parameters of `network`.
    ///
    /// Returns `Ok(false)` once the trace is exhausted.
    pub fn read_frame_into(&mut self, network: &mut Network) -> Result<bool> {
        match self.next_frame()? {
            Some(frame) => {
                network.load_frame(&frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Iterate over the remaining frames.
    pub fn frames(&mut self) -> Frames<'_, R> {
        Frames { reader: self }
    }

    fn read_next(&mut self) -> Result<Option<Frame>> {
        match read_token(&mut self.inner)? {
            Token::Eof => Ok(None),
            Token::FrameStart => {
                let frame = read_frame_body(&mut self.inner, &self.header)?;
                Ok(Some(frame))
            }
            other => Err(unexpected("FRAME_START or EOF", other)),
        }
    }
}

/// Iterator returned by [`TraceReader::frames`].
pub struct Frames<'a, R: Read> {
    reader: &'a mut TraceReader<R>,
}

impl<R: Read> Iterator for Frames<'_, R> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_frame().transpose()
    }
}

fn unexpected(expected: &str, found: Token) -> Error {
    Error::Format(format!("expected {expected}, found {found:?}"))
}

fn read_bytes<const N: usize, R: Read>(inner: &mut R, what: &str) -> Result<[u8; N]> {
    let mut buf = [0_u8; N];
    inner.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Format(format!("trace ended while reading {what}")),
        _ => Error::from(e),
    })?;
    Ok(buf)
}

fn read_token<R: Read>(inner: &mut R) -> Result<Token> {
    let [byte] = read_bytes::<1, R>(inner, "a token")?;
    Token::try_from(byte)
}

fn expect_token<R: Read>(inner: &mut R, expected: Token) -> Result<()> {
    let found = read_token(inner)?;
    if found != expected {
        return Err(unexpected(&format!("{expected:?}"), found));
    }
    Ok(())
}

fn read_u32<R: Read>(inner: &mut R, what: &str) -> Result<u32> {
    Ok(u32::from_ne_bytes(read_bytes(inner, what)?))
}

fn read_value<R: Read>(inner: &mut R) -> Result<Scalar> {
    Ok(Scalar::from_ne_bytes(read_bytes(inner, "a value")?))
}

fn read_header<R: Read>(inner: &mut R) -> Result<TraceHeader> {
    expect_token(inner, Token::LayerCount)?;
    let layer_count = read_u32(inner, "the layer count")? as usize;
    if layer_count < 2 {
        return Err(Error::Format(format!("layer count {layer_count} is below the minimum of 2")));
    }

    expect_token(inner, Token::Activation)?;
    let tag = read_u32(inner, "the activation tag")?;
    let activation =
        Activation::from_tag(tag).map_err(|e| Error::Format(format!("bad header: {e}")))?;

    // No `with_capacity`: the count is untrusted until the neuron counts are read.
    let mut layer_sizes = Vec::new();
    for layer in 0..layer_count {
        expect_token(inner, Token::NeuronCount)?;
        let n = read_u32(inner, "a neuron count")? as usize;
        if n == 0 {
            return Err(Error::Format(format!("layer {layer} has 0 neurons")));
        }
        layer_sizes.push(n);
    }

    expect_token(inner, Token::END_HEADER)?;

    Ok(TraceHeader {
        activation,
        layer_sizes,
    })
}

fn read_values<R: Read>(inner: &mut R, count: usize) -> Result<Vec<Scalar>> {
    // Capped: `count` comes from an untrusted header.
    let mut values = Vec::with_capacity(count.min(4096));
    for i in 0..count {
        if i > 0 {
            expect_token(inner, Token::ValueSeparator)?;
        }
        values.push(read_value(inner)?);
    }
    Ok(values)
}

fn read_frame_body<R: Read>(inner: &mut R, header: &TraceHeader) -> Result<Frame> {
    let mut transitions = Vec::with_capacity(header.transition_count());

    for w in header.layer_sizes.windows(2) {
        let (prev, next) = (w[0], w[1]);

        let count = prev
            .checked_mul(next)
            .ok_or_else(|| Error::Format(format!("weight count {prev} x {next} overflows")))?;

        expect_token(inner, Token::Weights)?;
        let weights = Matrix::from_row_major(next, prev, read_values(inner, count)?)?;

        expect_token(inner, Token::Biases)?;
        let biases = Matrix::from_row_major(next, 1, read_values(inner, next)?)?;

        transitions.push(TransitionParams { weights, biases });
    }

    expect_token(inner, Token::FrameEnd)?;
    Ok(Frame { transitions })
}
