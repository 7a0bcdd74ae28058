/*
 * Created on Tue Jan 07 2025
 *
 * This file is a part of Skygraph
 * Skygraph is a free and open-source embedded graph database that keeps
 * an entire labeled directed graph in a single on-disk file, written by
 * Sayan Nandan ("the Author") with the vision of making very large
 * graphs cheap to store and fast to walk on ordinary machines.
 *
 * Copyright (c) 2025, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

pub mod os {
    use {
        crate::IoResult,
        std::{fmt, fs::File, io},
    };

    #[derive(Debug)]
    #[repr(transparent)]
    /// A wrapper around [`std::io::Error`] that can be compared in tests
    pub struct SysIOError(io::Error);

    impl SysIOError {
        pub fn kind(&self) -> io::ErrorKind {
            self.0.kind()
        }
        pub fn into_inner(self) -> io::Error {
            self.0
        }
        pub fn inner(&self) -> &io::Error {
            &self.0
        }
    }

    impl From<io::Error> for SysIOError {
        fn from(e: io::Error) -> Self {
            Self(e)
        }
    }

    impl From<io::ErrorKind> for SysIOError {
        fn from(e: io::ErrorKind) -> Self {
            Self(e.into())
        }
    }

    impl fmt::Display for SysIOError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            self.0.fmt(f)
        }
    }

    impl PartialEq for SysIOError {
        fn eq(&self, other: &Self) -> bool {
            self.0.kind() == other.0.kind()
        }
    }

    /// Take an exclusive advisory lock on the file. The lock lives as long as the
    /// descriptor, so there is nothing to release explicitly; closing the file drops it.
    #[cfg(unix)]
    pub fn lock_file(f: &File) -> IoResult<()> {
        use {
            libc::{flock, LOCK_EX, LOCK_NB},
            std::os::unix::io::AsRawFd,
        };
        let result = unsafe {
            // UNSAFE: the borrowed file keeps the fd alive across the call
            flock(f.as_raw_fd(), LOCK_EX | LOCK_NB)
        };
        if result != 0 {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "file is already locked",
            ));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn lock_file(_: &File) -> IoResult<()> {
        // no advisory locking on this platform; single-writer discipline is on the caller
        Ok(())
    }
}

#[cfg(test)]
pub mod test_utils {
    //! Helpers for tests that want a real file on disk

    /// A uniquely named file in the temp directory, removed again on drop
    pub struct TestFile(String);

    impl TestFile {
        pub fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "skygraph-test-{}-{name}.sg",
                std::process::id()
            ));
            let path = path.to_string_lossy().into_owned();
            let _ = std::fs::remove_file(&path);
            Self(path)
        }
        pub fn path(&self) -> &str {
            &self.0
        }
    }

    impl Drop for TestFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }
}
