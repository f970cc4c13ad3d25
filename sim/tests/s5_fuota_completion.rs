mod common;

use common::*;
use fuota::{fragment, Reassembler};
use sim::Network;
use sim_region::RegionKind;

#[tokio::test]
async fn fuota_session_completes_then_device_rejoins_with_updated_payload() {
    let update = vec![b'x'; 500];
    let frags = fragment(&update, 192, 0);
    assert_eq!(frags.len(), 3);

    let mut reasm = Reassembler::new(0, frags[0].dst_crc, frags[0].chunk_count);
    let mut rounds = 0;
    for frag in frags.iter().rev() {
        rounds += 1;
        if reasm.accept(frag).unwrap() {
            break;
        }
    }
    assert!(rounds <= frags.len());
    assert!(reasm.is_complete());
    assert_eq!(reasm.finish().unwrap(), update);

    // Post-update, the device re-joins (fresh DevNonce) and its application
    // payload has changed to "hallo".
    let mut network = Network::new_virtual(vec![RegionKind::Eu868]);
    let key = nwkkey(b"@ABCDEFGHIJKLMNO");
    let dev_eui = [5u8; 8];

    network.medium.lock().unwrap().broadcast_complete(&jreq_msg(&key, dev_eui, 1));
    let jreq = network.gateway.next_up().await.unwrap().unwrap();
    let accept = network.lns.join(&jreq.msg, jreq.region, &default_join_params(key)).unwrap();

    let (nwk_skey, app_skey) = {
        let s = network.lns.sessions.by_addr(&accept.dev_addr).unwrap();
        (s.nwk_skey, s.app_skey)
    };
    let pdu = pack_uplink(false, accept.dev_addr, 0, 0, Some(15), b"hallo", &nwk_skey, &app_skey);
    network.medium.lock().unwrap().broadcast_complete(&uplink_msg(1, 1_000, &pdu));
    let up = network.gateway.next_up().await.unwrap().unwrap();
    let frame = network.lns.verify_uplink(&up.msg.payload, accept.dev_addr).unwrap();
    assert_eq!(&frame.frm_payload[..], b"hallo");
}
