/// Returns `true` iff `x` is a positive power of 2.
#[inline]
pub fn is_power_of_2(x: i32) -> bool {
    x > 0 && (x & (x - 1)) == 0
}

/// `x³` widened to `usize`, the number of samples in a cube with edge length `x`.
#[inline]
pub fn cube(x: i32) -> usize {
    let x = x as usize;

    x * x * x
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn powers_of_2() {
        assert!(is_power_of_2(1));
        assert!(is_power_of_2(32));
        assert!(is_power_of_2(512));

        assert!(!is_power_of_2(0));
        assert!(!is_power_of_2(-32));
        assert!(!is_power_of_2(48));
        assert!(!is_power_of_2(1023));
    }

    #[test]
    fn cube_widens_before_multiplying() {
        assert_eq!(cube(32), 32_768);
        assert_eq!(cube(66), 287_496);
        assert_eq!(cube(2048), 8_589_934_592);
    }
}
