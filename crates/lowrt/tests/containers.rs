use lowrt::arena::{Arena, HeapRegions};
use lowrt::array::{
    array_append, array_cap, array_from_bytes, array_len, array_push, array_slice, read_element,
};
use lowrt::table::{table_delete, table_entries, table_get, table_len, table_set};
use lowrt::text::{text_bytes, text_concat, text_new};
use lowrt::{Fault, ImageMemory, Key, Memory, NativeMemory, WordWidth, NULL};

fn widths() -> [WordWidth; 3] {
    [WordWidth::W16, WordWidth::W32, WordWidth::W64]
}

fn push_sequence<M: Memory>(m: &mut M, n: u32) -> u64 {
    let mut hdr = NULL;
    for i in 0..n {
        hdr = array_push(m, hdr, &i.to_le_bytes()).expect("push");
        let (len, cap) = (array_len(m, hdr), array_cap(m, hdr));
        assert_eq!(len, u64::from(i) + 1);
        assert!(cap >= len);
        assert!(cap >= 8 && cap.is_power_of_two(), "cap {cap}");
        assert!(cap < 2 * len || cap == 8, "cap {cap} overshoots len {len}");
    }
    hdr
}

fn check_sequence<M: Memory>(m: &M, hdr: u64, n: u32) {
    for i in 0..n {
        let e = read_element(m, hdr, u64::from(i)).expect("element");
        assert_eq!(e, i.to_le_bytes());
    }
}

fn exercise_containers<M: Memory>(m: &mut M) {
    let hdr = push_sequence(m, 100);
    check_sequence(m, hdr, 100);
    assert_eq!(array_cap(m, hdr), 128);

    let middle = array_slice(m, hdr, 40, 60).expect("slice");
    let grown = array_append(m, hdr, middle).expect("append");
    assert_eq!(array_len(m, grown), 120);
    assert_eq!(read_element(m, grown, 100).expect("e"), 40u32.to_le_bytes());
    assert_eq!(read_element(m, grown, 119).expect("e"), 59u32.to_le_bytes());

    let a = text_new(m, b"hello, ");
    let b = text_new(m, b"world");
    let joined = text_concat(m, a, b).expect("concat");
    assert_eq!(text_bytes(m, joined).expect("bytes"), b"hello, world");

    let mut t = NULL;
    for (i, name) in [&b"one"[..], b"two", b"three", b"four"].iter().enumerate() {
        let key = Key::Text(text_new(m, name));
        t = table_set(m, t, key, i as u64 + 1).expect("set");
    }
    let wanted = Key::Text(text_new(m, b"three"));
    assert_eq!(table_get(m, t, wanted).expect("get"), Some(3));
    let gone = Key::Text(text_new(m, b"one"));
    assert!(table_delete(m, t, gone).expect("delete"));
    assert_eq!(table_len(m, t), 3);
    let values: Vec<u64> = table_entries(m, t).into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![4, 2, 3]);
}

#[test]
fn containers_behave_the_same_at_every_width() {
    for width in widths() {
        let mut image = ImageMemory::new(width);
        exercise_containers(&mut image);
    }
}

#[test]
fn containers_on_native_memory() {
    let mut arena = Arena::with_min_region(HeapRegions, 4096);
    let mut m = unsafe { NativeMemory::new(&mut arena) };
    exercise_containers(&mut m);
    assert!(m.arena().stats().regions >= 1);
}

#[test]
fn byte_arrays_from_slices() {
    for width in widths() {
        let mut m = ImageMemory::new(width);
        let hdr = array_from_bytes(&mut m, b"abcdef", 2).expect("from bytes");
        assert_eq!(array_len(&m, hdr), 3);
        assert_eq!(read_element(&m, hdr, 2).expect("e"), b"ef");
        assert!(array_from_bytes(&mut m, b"abc", 2).is_err());
    }
}

#[test]
fn image_header_words_use_the_target_width() {
    let mut m = ImageMemory::new(WordWidth::W16);
    let hdr = array_from_bytes(&mut m, &[7u8; 3], 1).expect("array");
    let bytes = m.bytes();
    let at = hdr as usize;
    // {data, len, cap, elem_size}, two bytes each.
    assert_eq!(&bytes[at + 2..at + 8], &[3, 0, 3, 0, 1, 0]);
}

#[test]
fn integer_keys_never_alias_across_the_word_boundary() {
    for width in widths() {
        let mut m = ImageMemory::new(width);
        let max = width.max_value();
        let mut t = NULL;
        for k in [0, 1, max] {
            t = table_set(&mut m, t, Key::Int(k), 1).expect("set");
            t = table_set(&mut m, t, Key::Int(k), 2).expect("overwrite");
            assert_eq!(table_get(&m, t, Key::Int(k)).expect("get"), Some(2));
        }
        assert_eq!(table_len(&m, t), 3);

        let Some(wide) = max.checked_add(2) else {
            continue;
        };
        assert_eq!(
            table_set(&mut m, t, Key::Int(wide), 1),
            Err(Fault::WordOverflow {
                value: wide,
                bytes: width.bytes()
            })
        );
        assert_eq!(table_get(&m, t, Key::Int(wide)).expect("get"), None);
        assert!(table_set(&mut m, t, Key::Int(0), wide).is_err());
        assert_eq!(table_get(&m, t, Key::Int(0)).expect("get"), Some(2));
        assert_eq!(table_len(&m, t), 3);
    }
}
