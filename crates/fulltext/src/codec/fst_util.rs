use fst::{
    raw::{
        CompiledAddr,
        Fst,
        Output,
    },
    Map,
};

/// Returns the value of the greatest key `<=` `key`, walking the FST once.
///
/// Used to route a term seek to the dictionary block whose first term is
/// the floor of the target.
pub fn floor_lookup(map: &Map<Vec<u8>>, key: &[u8]) -> Option<u64> {
    let fst = map.as_fst();
    let mut node = fst.root();
    let mut out = Output::zero();
    let mut best = None;
    if node.is_final() {
        best = Some(out.cat(node.final_output()).value());
    }
    for &b in key {
        // Any transition strictly below `b` roots a subtree of keys that
        // compare less than `key`; its max is the best floor candidate so
        // far. Transitions are sorted by input byte.
        let mut exact = None;
        let mut below = None;
        for t in node.transitions() {
            if t.inp < b {
                below = Some(t);
            } else {
                if t.inp == b {
                    exact = Some(t);
                }
                break;
            }
        }
        if let Some(t) = below {
            best = Some(subtree_max(fst, out.cat(t.out), t.addr));
        }
        let Some(t) = exact else {
            return best;
        };
        out = out.cat(t.out);
        node = fst.node(t.addr);
        if node.is_final() {
            best = Some(out.cat(node.final_output()).value());
        }
    }
    best
}

/// Value of the greatest key in the subtree rooted at `addr`: follow the
/// last transition until a node with no outgoing edges.
fn subtree_max(fst: &Fst<Vec<u8>>, mut out: Output, addr: CompiledAddr) -> u64 {
    let mut node = fst.node(addr);
    loop {
        if node.len() == 0 {
            debug_assert!(node.is_final());
            return out.cat(node.final_output()).value();
        }
        let t = node.transition(node.len() - 1);
        out = out.cat(t.out);
        node = fst.node(t.addr);
    }
}
