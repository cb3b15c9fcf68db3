use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{
    dtls::{dtls_error::DtlsError, record},
    log::log_sink::LogSink,
    sink_debug, sink_trace, sink_warn,
};

/// Where outbound datagrams go: the embedder's UDP socket (or an ICE
/// component) sits behind this.
pub trait DatagramSink: Send + Sync {
    fn send_datagram(&self, buf: &[u8]) -> io::Result<()>;
}

struct Datagram {
    buf: Vec<u8>,
    offset: usize,
    len: usize,
}

struct Inner {
    queue: VecDeque<Datagram>,
    /// Recycled buffers, bounded by the queue capacity.
    free: Vec<Vec<u8>>,
    closed: bool,
}

/// Connection-oriented message channel between the packet transformer and the
/// DTLS state machine.
///
/// Inbound: a bounded FIFO of datagrams fed by the transformer; when full the
/// oldest is dropped and its buffer recycled. Outbound: records are coalesced
/// into as few datagrams as the handshake flight structure allows.
pub struct DatagramChannel {
    inner: Mutex<Inner>,
    available: Condvar,
    capacity: usize,
    mtu: usize,
    sink: Arc<dyn DatagramSink>,
    out_buf: Mutex<Vec<u8>>,
    overflow_drops: AtomicU64,
    logger: Arc<dyn LogSink>,
}

impl DatagramChannel {
    pub fn new(
        capacity: usize,
        mtu: usize,
        sink: Arc<dyn DatagramSink>,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                free: Vec::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
            mtu,
            sink,
            out_buf: Mutex::new(Vec::new()),
            overflow_drops: AtomicU64::new(0),
            logger,
        }
    }

    /// Number of inbound datagrams dropped to overflow so far.
    pub fn overflow_drops(&self) -> u64 {
        self.overflow_drops.load(Ordering::Relaxed)
    }

    /// Enqueue one inbound DTLS datagram. Oldest-drop on overflow; the evicted
    /// buffer goes to the free-list so sustained churn does not allocate.
    pub fn push_datagram(&self, data: &[u8]) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.closed {
            return;
        }
        if inner.queue.len() >= self.capacity {
            if let Some(old) = inner.queue.pop_front() {
                inner.free.push(old.buf);
            }
            self.overflow_drops.fetch_add(1, Ordering::Relaxed);
            sink_warn!(
                &self.logger,
                "[DTLS IO] Inbound queue full; dropped oldest datagram"
            );
        }
        let mut buf = inner.free.pop().unwrap_or_default();
        buf.clear();
        buf.extend_from_slice(data);
        let len = buf.len();
        inner.queue.push_back(Datagram {
            buf,
            offset: 0,
            len,
        });
        drop(inner);
        self.available.notify_one();
    }

    /// Copy bytes from the head datagram into `buf`.
    ///
    /// A datagram larger than `buf` is consumed across several calls; the
    /// remainder stays at the head. `timeout` of zero waits forever, matching
    /// the TLS library contract. Fails with [`DtlsError::Closed`] once the
    /// channel is torn down, also for already-queued data.
    pub fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, DtlsError> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        let mut inner = self.inner.lock().map_err(|_| DtlsError::Closed)?;
        loop {
            if inner.closed {
                return Err(DtlsError::Closed);
            }
            if !inner.queue.is_empty() {
                break;
            }
            match deadline {
                None => {
                    inner = self.available.wait(inner).map_err(|_| DtlsError::Closed)?;
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DtlsError::Timeout);
                    }
                    let (guard, res) = self
                        .available
                        .wait_timeout(inner, deadline - now)
                        .map_err(|_| DtlsError::Closed)?;
                    inner = guard;
                    if res.timed_out() && inner.queue.is_empty() && !inner.closed {
                        return Err(DtlsError::Timeout);
                    }
                }
            }
        }

        let finished = {
            let Some(head) = inner.queue.front_mut() else {
                return Err(DtlsError::Closed);
            };
            let remaining = head.len - head.offset;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&head.buf[head.offset..head.offset + n]);
            head.offset += n;
            (n, head.offset >= head.len)
        };
        if finished.1 {
            if let Some(done) = inner.queue.pop_front() {
                if inner.free.len() < self.capacity {
                    inner.free.push(done.buf);
                }
            }
        }
        Ok(finished.0)
    }

    /// Hand one or more outbound DTLS records to the coalescer. `data` is what
    /// the TLS stack wrote in one call and may span several records.
    pub fn send(&self, data: &[u8]) -> Result<(), DtlsError> {
        if self.is_closed() {
            return Err(DtlsError::Closed);
        }
        let mut rest = data;
        while !rest.is_empty() {
            let rec_len = match record::record_len(rest) {
                Some(n) => n,
                None => {
                    // not record-shaped; ship whatever is pending, then this
                    self.flush()?;
                    self.send_now(rest)?;
                    return Ok(());
                }
            };
            let (rec, tail) = rest.split_at(rec_len);
            self.push_record(rec)?;
            rest = tail;
        }
        Ok(())
    }

    fn push_record(&self, rec: &[u8]) -> Result<(), DtlsError> {
        if !record::coalescable(rec) {
            // alert / application_data travel alone
            self.flush()?;
            return self.send_now(rec);
        }
        {
            let mut out = self.out_buf.lock().map_err(|_| DtlsError::Closed)?;
            if !out.is_empty() && out.len() + rec.len() > self.mtu {
                let pending = std::mem::take(&mut *out);
                drop(out);
                self.send_now(&pending)?;
                let mut out = self.out_buf.lock().map_err(|_| DtlsError::Closed)?;
                out.extend_from_slice(rec);
            } else {
                out.extend_from_slice(rec);
            }
        }
        if record::ends_flight(rec) {
            self.flush()?;
        }
        Ok(())
    }

    /// Ship the coalescing buffer, if any.
    pub fn flush(&self) -> Result<(), DtlsError> {
        let pending = {
            let mut out = self.out_buf.lock().map_err(|_| DtlsError::Closed)?;
            if out.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *out)
        };
        self.send_now(&pending)
    }

    fn send_now(&self, data: &[u8]) -> Result<(), DtlsError> {
        sink_trace!(&self.logger, "[DTLS IO] Sending {} bytes", data.len());
        self.sink.send_datagram(data).map_err(DtlsError::Io)
    }

    /// Tear down: pending and future receives fail with CLOSED, waiters wake.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
            inner.queue.clear();
            inner.free.clear();
        }
        self.available.notify_all();
        sink_debug!(&self.logger, "[DTLS IO] Channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|i| i.closed).unwrap_or(true)
    }
}

/// Blocking `Read`/`Write` view of a [`DatagramChannel`] handed to the TLS
/// stack for the duration of one handshake attempt.
pub struct ChannelStream {
    channel: Arc<DatagramChannel>,
    read_timeout: Duration,
}

impl std::fmt::Debug for ChannelStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStream")
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl ChannelStream {
    pub fn new(channel: Arc<DatagramChannel>, read_timeout: Duration) -> Self {
        Self {
            channel,
            read_timeout,
        }
    }
}

impl Read for ChannelStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.channel.receive(buf, self.read_timeout) {
            Ok(n) => Ok(n),
            Err(DtlsError::Timeout) => Err(io::Error::from(io::ErrorKind::TimedOut)),
            // A fatal error here is the guard against the TLS retransmit loop
            // spinning forever on a closed transport.
            Err(DtlsError::Closed) => Err(io::Error::other("dtls channel closed")),
            Err(e) => Err(io::Error::other(e.to_string())),
        }
    }
}

impl Write for ChannelStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.channel.send(buf) {
            Ok(()) => Ok(buf.len()),
            Err(DtlsError::Closed) => Err(io::Error::other("dtls channel closed")),
            Err(DtlsError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e.to_string())),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.channel
            .flush()
            .map_err(|e| io::Error::other(e.to_string()))
    }
}
