#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use aya_ebpf::{
    bindings::{
        sk_action::SK_PASS, BPF_ANY, BPF_F_INGRESS, BPF_NOEXIST, BPF_SOCK_OPS_ACTIVE_ESTABLISHED_CB,
        BPF_SOCK_OPS_PASSIVE_ESTABLISHED_CB, BPF_SOCK_OPS_STATE_CB, BPF_SOCK_OPS_STATE_CB_FLAG,
        BPF_TCP_CLOSE,
    },
    cty::c_void,
    helpers::bpf_map_delete_elem,
    macros::{map, sk_msg, sock_ops},
    maps::{Array, HashMap, SockHash},
    programs::{SkMsgContext, SockOpsContext},
};
use aya_log_ebpf::{info, warn};
use meshsplice_common::{
    is_intercept_port, ConnTuple, Endpoint, WireAddrs, AF_INET, DEBUG_SLOTS, DEBUG_SLOT_LEVEL,
    DEBUG_SLOT_REDIRECTS, DEFAULT_TABLE_CAPACITY, INBOUND_PROXY_ADDR,
};

// --- BPF Maps (pinned by name so they outlive the loader) ---

/// Local endpoint of a fresh outbound connection -> its original destination.
#[map(name = "map_active_estab")]
static ACTIVE_ESTAB: HashMap<Endpoint, Endpoint> =
    HashMap::pinned(DEFAULT_TABLE_CAPACITY, 0);

/// Symmetric pairing of the two connections either side of the proxy.
#[map(name = "map_proxy")]
static PROXY_PAIRS: HashMap<ConnTuple, ConnTuple> =
    HashMap::pinned(DEFAULT_TABLE_CAPACITY, 0);

/// Sockets messages can be spliced into.
#[map(name = "map_redir")]
static REDIRECT: SockHash<ConnTuple> = SockHash::pinned(DEFAULT_TABLE_CAPACITY, 0);

/// Slot 0: verbosity. Slot 1: successful redirections.
#[map(name = "debug_map")]
static DEBUG: Array<u32> = Array::pinned(DEBUG_SLOTS, 0);

// --- Program 1: sockops ---
// Tracks connection establishment and close.

#[sock_ops]
pub fn meshsplice_sockops(ctx: SockOpsContext) -> u32 {
    try_sockops(&ctx);
    0
}

fn try_sockops(ctx: &SockOpsContext) {
    let wire = WireAddrs {
        local_ip4: ctx.local_ip4(),
        local_port: ctx.local_port(),
        remote_ip4: ctx.remote_ip4(),
        remote_port: ctx.remote_port(),
    };
    // Dual-stack sockets with an IPv4 peer still count.
    if !(ctx.family() == AF_INET || wire.remote_ip4 != 0) {
        return;
    }
    let _ = ctx.set_cb_flags(BPF_SOCK_OPS_STATE_CB_FLAG as i32);

    let tuple = wire.normalize();
    match ctx.op() {
        BPF_SOCK_OPS_ACTIVE_ESTABLISHED_CB => active_established(ctx, tuple),
        BPF_SOCK_OPS_PASSIVE_ESTABLISHED_CB => passive_established(ctx, tuple),
        BPF_SOCK_OPS_STATE_CB if ctx.arg(1) == BPF_TCP_CLOSE => closed(tuple),
        _ => {}
    }
}

fn active_established(ctx: &SockOpsContext, tuple: ConnTuple) {
    if tuple.local.addr == INBOUND_PROXY_ADDR {
        register(ctx, tuple);
        return;
    }
    if tuple.local.addr == tuple.remote.addr {
        return;
    }
    let _ = ACTIVE_ESTAB.insert(&tuple.local, &tuple.remote, BPF_NOEXIST as u64);
    register(ctx, tuple);
}

fn passive_established(ctx: &SockOpsContext, tuple: ConnTuple) {
    if tuple.remote.addr == INBOUND_PROXY_ADDR {
        register(ctx, tuple);
        return;
    }
    let original_dst = match unsafe { ACTIVE_ESTAB.get(&tuple.remote) } {
        Some(dst) => *dst,
        None => return,
    };
    if !is_intercept_port(tuple.local.port) {
        return;
    }

    let client = ConnTuple::new(tuple.remote, original_dst);
    if PROXY_PAIRS.insert(&client, &tuple, BPF_ANY as u64).is_ok()
        && PROXY_PAIRS.insert(&tuple, &client, BPF_ANY as u64).is_err()
    {
        let _ = PROXY_PAIRS.remove(&client);
    }
    register(ctx, tuple);
    let _ = ACTIVE_ESTAB.remove(&tuple.remote);
}

fn closed(tuple: ConnTuple) {
    if let Some(partner) = unsafe { PROXY_PAIRS.get(&tuple) }.copied() {
        let _ = PROXY_PAIRS.remove(&tuple);
        if unsafe { PROXY_PAIRS.get(&partner) }.copied() == Some(tuple) {
            let _ = PROXY_PAIRS.remove(&partner);
        }
    }
    let _ = ACTIVE_ESTAB.remove(&tuple.local);
}

fn register(ctx: &SockOpsContext, tuple: ConnTuple) {
    let mut key = tuple;
    let _ = REDIRECT.update(&mut key, unsafe { &mut *ctx.ops }, BPF_ANY as u64);
}

fn unregister(tuple: &ConnTuple) {
    // SockHash exposes no delete; go through the helper directly.
    unsafe {
        bpf_map_delete_elem(
            &REDIRECT as *const _ as *mut c_void,
            tuple as *const _ as *const c_void,
        );
    }
}

// --- Program 2: sk_msg ---
// Splices each outbound message into the paired socket's receive queue.

#[sk_msg]
pub fn meshsplice_redirect(ctx: SkMsgContext) -> u32 {
    try_redirect(&ctx);
    // Redirection is a side effect; the send itself always completes.
    SK_PASS
}

fn try_redirect(ctx: &SkMsgContext) {
    let md = unsafe { &*ctx.msg };
    let this = WireAddrs {
        local_ip4: md.local_ip4,
        local_port: md.local_port,
        remote_ip4: md.remote_ip4,
        remote_port: md.remote_port,
    }
    .normalize();

    let mut target = if this.touches_inbound_proxy() {
        this.mirror()
    } else {
        let _ = ACTIVE_ESTAB.remove(&this.local);
        let paired = match unsafe { PROXY_PAIRS.get(&this) } {
            Some(paired) => *paired,
            None => {
                unregister(&this);
                return;
            }
        };
        if !is_intercept_port(this.local.port) && !is_intercept_port(paired.local.port) {
            let _ = PROXY_PAIRS.remove(&this);
            let _ = PROXY_PAIRS.remove(&paired);
            unregister(&this);
            unregister(&paired);
            return;
        }
        paired
    };

    let rc = REDIRECT.redirect_msg(ctx, &mut target, BPF_F_INGRESS as u64);

    let level = DEBUG.get(DEBUG_SLOT_LEVEL).copied().unwrap_or(0);
    if level > 0 {
        info!(
            ctx,
            "message {:i}:{} -> {:i}:{}",
            this.local.addr,
            this.local.port,
            this.remote.addr,
            this.remote.port
        );
    }

    if rc == SK_PASS as i64 {
        if level > 0 {
            info!(ctx, "data redirection ok! {:i} -> {:i}", this.local.addr, this.remote.addr);
        }
        if level > 1 {
            if let Some(slot) = DEBUG.get_ptr_mut(DEBUG_SLOT_REDIRECTS) {
                let counter = unsafe { AtomicU32::from_ptr(slot) };
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    } else if level > 0 {
        warn!(
            ctx,
            "data redirection failed: {:i}:{} -> {:i}:{}",
            this.local.addr,
            this.local.port,
            this.remote.addr,
            this.remote.port
        );
    }
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 4] = *b"GPL\0";

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
