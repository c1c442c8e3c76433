//! Two-stage collective byte exchange with a fixed peer set.
//!
//! Stage 1 sends every peer the byte length of its message (possibly
//! zero); stage 2 moves the non-empty messages. Each stage posts all of
//! its sends before any receive, and every posted handle is drained before
//! returning, even when an error is reported.

use std::collections::{BTreeMap, BTreeSet};

use crate::algs::communicator::{Communicator, ExchangeTags, Wait};
use crate::algs::wire::WireLen;
use crate::mesh_error::HaloError;

/// Exchange one message with every rank in `peers`.
///
/// `peers` must be symmetric across ranks: if this rank lists `p`, rank
/// `p` lists this rank. Missing entries in `outgoing` send an empty message.
pub fn exchange_bytes<C: Communicator>(
    comm: &C,
    tags: ExchangeTags,
    peers: &BTreeSet<usize>,
    outgoing: &BTreeMap<usize, Vec<u8>>,
) -> Result<BTreeMap<usize, Vec<u8>>, HaloError> {
    let incoming_lens = exchange_lengths(comm, tags, peers, outgoing)?;

    // --- stage 2: payloads ---
    let mut pending_sends = Vec::with_capacity(peers.len());
    for &nbr in peers {
        if let Some(buf) = outgoing.get(&nbr).filter(|b| !b.is_empty()) {
            log::debug!("rank {} -> {nbr}: {} bytes", comm.rank(), buf.len());
            pending_sends.push(comm.isend(nbr, tags.data.as_u16(), buf));
        }
    }
    let mut pending_recvs = Vec::with_capacity(incoming_lens.len());
    for (&nbr, &len) in &incoming_lens {
        if len == 0 {
            continue;
        }
        let mut buf = vec![0u8; len];
        let h = comm.irecv(nbr, tags.data.as_u16(), &mut buf);
        pending_recvs.push((nbr, len, h));
    }

    let mut received = BTreeMap::new();
    let mut maybe_err = None;
    for (nbr, len, h) in pending_recvs {
        match h.wait() {
            Some(data) if data.len() == len => {
                received.insert(nbr, data);
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(HaloError::CommError {
                    neighbor: nbr,
                    reason: format!("expected {len} payload bytes, got {}", data.len()),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(HaloError::CommError {
                    neighbor: nbr,
                    reason: format!("failed to receive payload from rank {nbr}"),
                });
            }
            _ => {}
        }
    }
    for send in pending_sends {
        let _ = send.wait();
    }
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(received),
    }
}

/// Stage 1: tell each peer how many bytes to expect and learn the same.
fn exchange_lengths<C: Communicator>(
    comm: &C,
    tags: ExchangeTags,
    peers: &BTreeSet<usize>,
    outgoing: &BTreeMap<usize, Vec<u8>>,
) -> Result<BTreeMap<usize, usize>, HaloError> {
    let mut pending_sends = Vec::with_capacity(peers.len());
    let mut send_bufs = Vec::with_capacity(peers.len());
    for &nbr in peers {
        let len = WireLen::new(outgoing.get(&nbr).map_or(0, Vec::len));
        pending_sends.push(comm.isend(
            nbr,
            tags.sizes.as_u16(),
            bytemuck::bytes_of(&len),
        ));
        send_bufs.push(len);
    }

    let mut pending_recvs = Vec::with_capacity(peers.len());
    for &nbr in peers {
        let mut len = WireLen::new(0);
        let h = comm.irecv(nbr, tags.sizes.as_u16(), bytemuck::bytes_of_mut(&mut len));
        pending_recvs.push((nbr, h));
    }

    let mut lens = BTreeMap::new();
    let mut maybe_err = None;
    for (nbr, h) in pending_recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireLen>() => {
                let len: WireLen = bytemuck::pod_read_unaligned(&data);
                match usize::try_from(len.get()) {
                    Ok(n) => {
                        lens.insert(nbr, n);
                    }
                    Err(_) if maybe_err.is_none() => {
                        maybe_err = Some(HaloError::CommError {
                            neighbor: nbr,
                            reason: format!("announced length {} overflows usize", len.get()),
                        });
                    }
                    Err(_) => {}
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(HaloError::CommError {
                    neighbor: nbr,
                    reason: format!(
                        "expected {} bytes for size header, got {}",
                        std::mem::size_of::<WireLen>(),
                        data.len()
                    ),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(HaloError::CommError {
                    neighbor: nbr,
                    reason: format!("failed to receive size from rank {nbr}"),
                });
            }
            _ => {} // already have an error; just drain
        }
    }

    for send in pending_sends {
        let _ = send.wait();
    }
    drop(send_bufs);

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(lens),
    }
}
