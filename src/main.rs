fn main() {
    android_debloater_lib::run()
}
